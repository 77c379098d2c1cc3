//! Service configuration.

use crate::permit::SaturationPolicy;
use crate::table::TableLimits;

/// Upper bound on either bed array; keeps bed numbers well inside `u32`.
pub const MAX_BEDS: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Identifies this shared allocation table in logs and health snapshots.
    pub instance: String,
    pub limits: TableLimits,
    /// Maximum number of requests processed concurrently.
    pub workers: usize,
    /// Admitted requests allowed to wait for a handler.
    pub queue_depth: usize,
    pub when_saturated: SaturationPolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            instance: "ward".to_string(),
            limits: TableLimits::default(),
            workers: 8,
            queue_depth: 64,
            when_saturated: SaturationPolicy::Wait,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("instance name must not be empty")]
    EmptyInstance,
    #[error("at least one regular bed is required")]
    NoRegularBeds,
    #[error("{kind} bed count {count} exceeds the supported maximum of {max}")]
    TooManyBeds {
        kind: &'static str,
        count: usize,
        max: usize,
    },
    #[error("max patients must be between 1 and 4294967295")]
    InvalidMaxPatients,
    #[error("at least one worker is required")]
    NoWorkers,
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instance.trim().is_empty() {
            return Err(ConfigError::EmptyInstance);
        }
        if self.limits.regular_beds == 0 {
            return Err(ConfigError::NoRegularBeds);
        }
        if self.limits.regular_beds > MAX_BEDS {
            return Err(ConfigError::TooManyBeds {
                kind: "regular",
                count: self.limits.regular_beds,
                max: MAX_BEDS,
            });
        }
        if self.limits.emergency_beds > MAX_BEDS {
            return Err(ConfigError::TooManyBeds {
                kind: "emergency",
                count: self.limits.emergency_beds,
                max: MAX_BEDS,
            });
        }
        if self.limits.max_patients == 0 || self.limits.max_patients > u32::MAX as usize {
            return Err(ConfigError::InvalidMaxPatients);
        }
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        Ok(())
    }
}
