//! Allocation table: patient records, bed occupancy and the id counter.
//!
//! The table itself has no locking. It is owned by [`BedAllocator`], which
//! holds it behind the state lock and is the only code that mutates it.
//!
//! [`BedAllocator`]: crate::allocator::BedAllocator

use serde::Serialize;

use crate::patient::{BedNumber, PatientId, PatientRecord};

/// Capacity limits fixed at server start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableLimits {
    pub regular_beds: usize,
    pub emergency_beds: usize,
    /// Upper bound on identifiers handed out over the table's lifetime.
    pub max_patients: usize,
}

impl Default for TableLimits {
    fn default() -> Self {
        Self {
            regular_beds: 10,
            emergency_beds: 3,
            max_patients: 100,
        }
    }
}

impl TableLimits {
    pub fn total_beds(&self) -> usize {
        self.regular_beds + self.emergency_beds
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BedKind {
    Regular,
    Emergency,
}

/// Point-in-time occupancy counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Occupancy {
    pub regular_free: usize,
    pub regular_total: usize,
    pub emergency_free: usize,
    pub emergency_total: usize,
    pub active_patients: usize,
    pub next_id: u32,
}

impl Occupancy {
    pub fn is_full(&self) -> bool {
        self.regular_free == 0 && self.emergency_free == 0
    }
}

pub struct AllocationTable {
    limits: TableLimits,
    /// Indexed by patient id, grown as ids are stored. `None` for ids whose
    /// admission was rejected.
    patients: Vec<Option<PatientRecord>>,
    next_id: u32,
    regular_beds: Vec<Option<PatientId>>,
    emergency_beds: Vec<Option<PatientId>>,
}

impl AllocationTable {
    pub fn new(limits: TableLimits) -> Self {
        Self {
            limits,
            patients: Vec::new(),
            next_id: 0,
            regular_beds: vec![None; limits.regular_beds],
            emergency_beds: vec![None; limits.emergency_beds],
        }
    }

    pub fn limits(&self) -> TableLimits {
        self.limits
    }

    pub fn next_id(&self) -> PatientId {
        PatientId::new(self.next_id)
    }

    /// Hand out the next identifier, or `None` once every slot of the
    /// patient storage has been assigned.
    pub(crate) fn take_next_id(&mut self) -> Option<PatientId> {
        if self.next_id as usize >= self.limits.max_patients {
            return None;
        }
        let id = PatientId::new(self.next_id);
        self.next_id += 1;
        Some(id)
    }

    /// First-fit claim of a regular bed.
    pub(crate) fn claim_regular(&mut self, id: PatientId) -> Option<BedNumber> {
        let slot = first_free(&self.regular_beds)?;
        self.regular_beds[slot] = Some(id);
        Some(BedNumber::new(slot as u32 + 1))
    }

    /// First-fit claim of an emergency bed.
    pub(crate) fn claim_emergency(&mut self, id: PatientId) -> Option<BedNumber> {
        let slot = first_free(&self.emergency_beds)?;
        self.emergency_beds[slot] = Some(id);
        Some(BedNumber::new((self.limits.regular_beds + slot) as u32 + 1))
    }

    /// Free a bed, returning its previous occupant.
    pub(crate) fn vacate(&mut self, bed: BedNumber) -> Option<PatientId> {
        let (beds, slot) = self.slot_of(bed)?;
        let beds = match beds {
            BedKind::Regular => &mut self.regular_beds,
            BedKind::Emergency => &mut self.emergency_beds,
        };
        beds[slot].take()
    }

    pub(crate) fn store(&mut self, record: PatientRecord) {
        let index = record.id.index();
        if index >= self.patients.len() {
            self.patients.resize(index + 1, None);
        }
        self.patients[index] = Some(record);
    }

    pub fn record(&self, id: PatientId) -> Option<&PatientRecord> {
        self.patients.get(id.index())?.as_ref()
    }

    pub(crate) fn active_record_mut(&mut self, id: PatientId) -> Option<&mut PatientRecord> {
        self.patients
            .get_mut(id.index())?
            .as_mut()
            .filter(|record| record.active)
    }

    /// Active records in ascending id order.
    pub fn active_records(&self) -> impl Iterator<Item = &PatientRecord> {
        self.patients
            .iter()
            .flatten()
            .filter(|record| record.active)
    }

    pub fn bed_kind(&self, bed: BedNumber) -> Option<BedKind> {
        self.slot_of(bed).map(|(kind, _)| kind)
    }

    pub fn occupant(&self, bed: BedNumber) -> Option<PatientId> {
        let (kind, slot) = self.slot_of(bed)?;
        match kind {
            BedKind::Regular => self.regular_beds[slot],
            BedKind::Emergency => self.emergency_beds[slot],
        }
    }

    pub fn occupancy(&self) -> Occupancy {
        Occupancy {
            regular_free: count_free(&self.regular_beds),
            regular_total: self.limits.regular_beds,
            emergency_free: count_free(&self.emergency_beds),
            emergency_total: self.limits.emergency_beds,
            active_patients: self.active_records().count(),
            next_id: self.next_id,
        }
    }

    fn slot_of(&self, bed: BedNumber) -> Option<(BedKind, usize)> {
        let n = bed.get() as usize;
        let regular = self.limits.regular_beds;
        match n {
            0 => None,
            n if n <= regular => Some((BedKind::Regular, n - 1)),
            n if n <= self.limits.total_beds() => Some((BedKind::Emergency, n - regular - 1)),
            _ => None,
        }
    }
}

fn first_free(beds: &[Option<PatientId>]) -> Option<usize> {
    beds.iter().position(Option::is_none)
}

fn count_free(beds: &[Option<PatientId>]) -> usize {
    beds.iter().filter(|slot| slot.is_none()).count()
}
