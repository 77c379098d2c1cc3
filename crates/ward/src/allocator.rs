//! Bed allocation over the shared table.
//!
//! Every operation takes the state lock for its whole duration and never
//! awaits while holding it. The lock lives inside the server process, so a
//! crash cannot leave it held; a panic inside a critical section poisons it,
//! and the next caller recovers the table instead of wedging every handler.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::audit::{AuditSink, ReleaseEvent};
use crate::patient::{BedNumber, NewPatient, PatientId, PatientRecord, PatientSummary};
use crate::table::{AllocationTable, Occupancy, TableLimits};

/// Successful admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admitted {
    pub id: PatientId,
    pub bed: BedNumber,
}

impl fmt::Display for Admitted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Admitted: ID={} Bed={}", self.id, self.bed)
    }
}

/// Rejections. The `Display` text is the response line sent to the requester.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    /// No regular bed, and either not critical or no emergency bed. The
    /// identifier assigned to the attempt stays consumed.
    #[error("No beds available")]
    NoBeds { consumed: PatientId },

    /// Every identifier the table can index has been handed out.
    #[error("Patient capacity exhausted")]
    CapacityExhausted { max_patients: usize },

    /// Release of an unknown or already released identifier.
    #[error("Invalid patient ID")]
    InvalidPatientId(PatientId),

    #[error("Patient not found")]
    PatientNotFound,
}

pub struct BedAllocator {
    table: Mutex<AllocationTable>,
    audit: Arc<dyn AuditSink>,
}

impl BedAllocator {
    pub fn new(limits: TableLimits, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            table: Mutex::new(AllocationTable::new(limits)),
            audit,
        }
    }

    /// Admit a patient into the first free regular bed, overflowing into
    /// emergency beds only for critical patients.
    pub fn admit(&self, patient: NewPatient) -> Result<Admitted, AllocError> {
        let mut table = self.lock("admit");

        let Some(id) = table.take_next_id() else {
            let max_patients = table.limits().max_patients;
            tracing::warn!(max_patients, "Admission rejected: identifier space exhausted");
            return Err(AllocError::CapacityExhausted { max_patients });
        };

        let bed = match table.claim_regular(id) {
            Some(bed) => Some(bed),
            None if patient.critical => table.claim_emergency(id),
            None => None,
        };

        let Some(bed) = bed else {
            tracing::info!(patient_id = %id, critical = patient.critical, "No beds available");
            return Err(AllocError::NoBeds { consumed: id });
        };

        tracing::info!(patient_id = %id, bed = %bed, critical = patient.critical, "Patient admitted");
        table.store(PatientRecord::admitted(id, bed, patient));
        Ok(Admitted { id, bed })
    }

    /// Release an active patient and free its bed.
    ///
    /// Returns the record as it was at release time (already marked inactive).
    pub fn release(&self, id: PatientId) -> Result<PatientRecord, AllocError> {
        let mut table = self.lock("release");

        let Some(record) = table.active_record_mut(id) else {
            tracing::info!(patient_id = %id, "Release of unknown or inactive patient");
            return Err(AllocError::InvalidPatientId(id));
        };
        record.active = false;
        let record = record.clone();

        match table.vacate(record.bed) {
            Some(occupant) if occupant == id => {}
            occupant => {
                // Only reachable if the table invariant was broken elsewhere.
                tracing::error!(
                    patient_id = %id,
                    bed = %record.bed,
                    ?occupant,
                    "Bed occupant did not match released patient"
                );
            }
        }

        // Stamped under the lock, written after it. Concurrent releases may
        // reach the sink out of timestamp order.
        let event = ReleaseEvent::now(record.clone());
        drop(table);

        if let Err(e) = self.audit.record(&event) {
            tracing::error!(patient_id = %id, error = %e, "Failed to record release in audit log");
        }

        tracing::info!(patient_id = %id, bed = %record.bed, "Patient released");
        Ok(record)
    }

    /// First active patient, by ascending id, with the given national id.
    pub fn find_by_national_id(&self, national_id: &str) -> Result<PatientSummary, AllocError> {
        let table = self.lock("search");
        table
            .active_records()
            .find(|record| record.national_id == national_id)
            .map(PatientRecord::summary)
            .ok_or(AllocError::PatientNotFound)
    }

    pub fn occupancy(&self) -> Occupancy {
        self.lock("occupancy").occupancy()
    }

    fn lock(&self, op: &'static str) -> StateGuard<'_> {
        tracing::trace!(op, "Waiting for state lock");
        let guard = match self.table.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!(op, "State lock poisoned by a panicked handler - recovering table");
                self.table.clear_poison();
                poisoned.into_inner()
            }
        };
        tracing::trace!(op, "State lock acquired");
        StateGuard { guard, op }
    }
}

/// State lock guard that traces its release.
struct StateGuard<'a> {
    guard: MutexGuard<'a, AllocationTable>,
    op: &'static str,
}

impl std::ops::Deref for StateGuard<'_> {
    type Target = AllocationTable;

    fn deref(&self) -> &AllocationTable {
        &self.guard
    }
}

impl std::ops::DerefMut for StateGuard<'_> {
    fn deref_mut(&mut self) -> &mut AllocationTable {
        &mut self.guard
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        tracing::trace!(op = self.op, "State lock released");
    }
}
