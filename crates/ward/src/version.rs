//! Version information for ward.

use crate::bridge::protocol::PROTOCOL_VERSION;

/// Ward version from Cargo.toml
pub const WARD_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct VersionInfo {
    pub ward: &'static str,
    /// Wire protocol version spoken by this build.
    pub protocol: u16,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            ward: WARD_VERSION,
            protocol: PROTOCOL_VERSION,
        }
    }
}

impl VersionInfo {
    pub fn new() -> Self {
        Self::default()
    }
}
