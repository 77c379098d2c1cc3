//! Handler permits bounding how many requests are processed concurrently.
//!
//! A queue slot is reserved while a request is admitted and becomes a
//! permit once a worker is idle. Both return to the pool when the handler
//! finishes, whatever the outcome.

mod pool;

pub use pool::{HandlerPermit, HandlerPool, PermitError, QueueSlot, SaturationPolicy, WorkerId};
