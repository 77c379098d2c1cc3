//! Patient domain types shared by the table, the allocator and the wire protocol.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier assigned to a patient at admission.
///
/// Assigned from a monotonically increasing counter starting at 0. An
/// identifier is never reused, even after its patient is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(u32);

impl PatientId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One-based bed number.
///
/// Regular beds occupy `1..=R`, emergency beds `R+1..=R+E`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BedNumber(u32);

impl BedNumber {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for BedNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Patient details supplied by the requester on admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPatient {
    pub name: String,
    pub age: u32,
    pub national_id: String,
    pub phone: String,
    #[serde(default)]
    pub critical: bool,
}

/// A stored patient record.
///
/// Invariant: `active` is true exactly while `bed` is occupied by `id` in the
/// allocation table. Inactive records keep their last bed number for auditing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatientRecord {
    pub id: PatientId,
    pub name: String,
    pub age: u32,
    pub national_id: String,
    pub phone: String,
    pub bed: BedNumber,
    pub critical: bool,
    pub active: bool,
}

impl PatientRecord {
    pub(crate) fn admitted(id: PatientId, bed: BedNumber, patient: NewPatient) -> Self {
        Self {
            id,
            name: patient.name,
            age: patient.age,
            national_id: patient.national_id,
            phone: patient.phone,
            bed,
            critical: patient.critical,
            active: true,
        }
    }

    pub fn summary(&self) -> PatientSummary {
        PatientSummary {
            id: self.id,
            name: self.name.clone(),
            age: self.age,
            phone: self.phone.clone(),
            bed: self.bed,
            critical: self.critical,
        }
    }
}

/// Read-only view returned by a national-id search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientSummary {
    pub id: PatientId,
    pub name: String,
    pub age: u32,
    pub phone: String,
    pub bed: BedNumber,
    pub critical: bool,
}

impl fmt::Display for PatientSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ID={} Name={} Age={} Phone={} Bed={} Critical={}",
            self.id,
            self.name,
            self.age,
            self.phone,
            self.bed,
            u8::from(self.critical)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NewPatient {
        NewPatient {
            name: "Ayesha Khan".to_string(),
            age: 42,
            national_id: "3520212345671".to_string(),
            phone: "03001234567".to_string(),
            critical: true,
        }
    }

    #[test]
    fn admitted_record_is_active() {
        let record = PatientRecord::admitted(PatientId::new(7), BedNumber::new(11), sample());
        assert!(record.active);
        assert_eq!(record.id.get(), 7);
        assert_eq!(record.bed.get(), 11);
        assert_eq!(record.national_id, "3520212345671");
    }

    #[test]
    fn summary_renders_search_line() {
        let record = PatientRecord::admitted(PatientId::new(3), BedNumber::new(4), sample());
        assert_eq!(
            record.summary().to_string(),
            "ID=3 Name=Ayesha Khan Age=42 Phone=03001234567 Bed=4 Critical=1"
        );
    }

    #[test]
    fn critical_defaults_to_false_on_the_wire() {
        let patient: NewPatient = serde_json::from_value(serde_json::json!({
            "name": "Bilal",
            "age": 30,
            "national_id": "1",
            "phone": "2",
        }))
        .unwrap();
        assert!(!patient.critical);
    }
}
