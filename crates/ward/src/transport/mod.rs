//! Transport layer for ward.
//!
//! Serves the allocation service over a unix-domain socket. Each accepted
//! connection carries one request and its one reply.

mod server;

pub use server::{ServerConfig, serve, serve_on};
