//! ward: concurrent hospital bed allocation over a shared table.

mod version;

pub mod allocator;
pub mod audit;
pub mod bridge;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod gate;
pub mod patient;
pub mod permit;
pub mod reply;
pub mod service;
pub mod table;
pub mod transport;

pub use allocator::{Admitted, AllocError, BedAllocator};
pub use audit::{
    AuditError, AuditSink, FileAuditSink, MemoryAuditSink, NullAuditSink, ReleaseEvent,
};
pub use client::{Client, ClientError};
pub use config::{ConfigError, ServiceConfig};
pub use patient::{BedNumber, NewPatient, PatientId, PatientRecord, PatientSummary};
pub use permit::SaturationPolicy;
pub use service::{BedService, HealthSnapshot, ServiceError};
pub use table::{Occupancy, TableLimits};
pub use version::{VersionInfo, WARD_VERSION};
