//! Append-only audit trail of patient releases.
//!
//! The allocator stamps one [`ReleaseEvent`] per successful release under the
//! state lock and hands it to the sink after releasing the lock, so a slow
//! sink never blocks other requests. A failing sink is logged by the caller
//! and never undoes the release.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};

use crate::patient::PatientRecord;

/// A released patient as it looked at the moment of release.
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseEvent {
    pub timestamp: DateTime<Local>,
    pub record: PatientRecord,
}

impl ReleaseEvent {
    pub fn now(record: PatientRecord) -> Self {
        Self {
            timestamp: Local::now(),
            record,
        }
    }
}

impl fmt::Display for ReleaseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = &self.record;
        write!(
            f,
            "[{}] Released: ID={} Name={} Age={} CNIC={} Phone={} Bed={} Critical={}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            r.id,
            r.name,
            r.age,
            r.national_id,
            r.phone,
            r.bed,
            u8::from(r.critical)
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("failed to append to audit log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: &ReleaseEvent) -> Result<(), AuditError>;
}

/// Appends one line per event to a text file, creating it on first use.
#[derive(Debug, Clone)]
pub struct FileAuditSink {
    path: PathBuf,
}

impl FileAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, event: &ReleaseEvent) -> Result<(), AuditError> {
        let io_err = |source| AuditError::Io {
            path: self.path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        writeln!(file, "{event}").map_err(io_err)
    }
}

/// Keeps events in memory. Used by tests and embedded callers.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<ReleaseEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ReleaseEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &ReleaseEvent) -> Result<(), AuditError> {
        let mut events = match self.events.lock() {
            Ok(events) => events,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push(event.clone());
        Ok(())
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _event: &ReleaseEvent) -> Result<(), AuditError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::patient::{BedNumber, NewPatient, PatientId};

    fn event() -> ReleaseEvent {
        let record = PatientRecord {
            active: false,
            ..PatientRecord::admitted(
                PatientId::new(4),
                BedNumber::new(12),
                NewPatient {
                    name: "Sana Malik".to_string(),
                    age: 61,
                    national_id: "4210112345678".to_string(),
                    phone: "03211234567".to_string(),
                    critical: true,
                },
            )
        };
        ReleaseEvent {
            timestamp: Local.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap(),
            record,
        }
    }

    #[test]
    fn release_line_format() {
        assert_eq!(
            event().to_string(),
            "[2026-03-14 09:26:53] Released: ID=4 Name=Sana Malik Age=61 \
             CNIC=4210112345678 Phone=03211234567 Bed=12 Critical=1"
        );
    }

    #[test]
    fn file_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patient_log.txt");
        let sink = FileAuditSink::new(&path);

        sink.record(&event()).unwrap();
        sink.record(&event()).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with("Bed=12 Critical=1"));
    }

    #[test]
    fn file_sink_reports_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileAuditSink::new(dir.path().join("missing").join("log.txt"));
        let err = sink.record(&event()).unwrap_err();
        assert!(matches!(err, AuditError::Io { .. }));
    }

    #[test]
    fn memory_sink_keeps_events_in_order() {
        let sink = MemoryAuditSink::new();
        let mut second = event();
        second.record.id = PatientId::new(5);
        sink.record(&event()).unwrap();
        sink.record(&second).unwrap();

        let ids: Vec<_> = sink.events().iter().map(|e| e.record.id.get()).collect();
        assert_eq!(ids, vec![4, 5]);
    }
}
