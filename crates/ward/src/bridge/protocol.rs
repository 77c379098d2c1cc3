//! Wire protocol types for requester-server communication.
//!
//! Every frame carries a protocol version and a correlation id. The server
//! answers each request with exactly one [`Response`] echoing that id.

use serde::{Deserialize, Serialize};

use crate::patient::{NewPatient, PatientId};

pub const PROTOCOL_VERSION: u16 = 1;

/// Correlates a response with the request that produced it.
///
/// UUID v4 so concurrent requesters on the same host never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(uuid::Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        let uuid = uuid::Uuid::parse_str(s)?;
        Ok(Self(uuid))
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who sent a request. Informational only; never used for authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub pid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Requester {
    /// The calling process.
    pub fn current() -> Self {
        Self {
            pid: std::process::id(),
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    #[serde(alias = "insert")]
    Admit {
        patient: NewPatient,
    },

    Release {
        patient_id: PatientId,
    },

    Search {
        national_id: String,
    },

    /// Any command type this server does not recognize.
    #[serde(other)]
    Unknown,
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Admit { .. } => "admit",
            Self::Release { .. } => "release",
            Self::Search { .. } => "search",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub version: u16,
    pub id: RequestId,
    pub requester: Requester,
    pub command: Command,
}

impl Request {
    pub fn new(requester: Requester, command: Command) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            id: RequestId::new(),
            requester,
            command,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.version == PROTOCOL_VERSION
    }
}

/// A single human-readable response line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub version: u16,
    pub id: RequestId,
    pub message: String,
}

impl Response {
    pub fn new(id: RequestId, message: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            id,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ResponseKind {
        ResponseKind::classify(&self.message)
    }
}

/// Fixed response lines. Admission and search successes carry data and are
/// rendered by their result types.
pub mod lines {
    pub const RELEASED: &str = "Patient released";
    pub const UNKNOWN_COMMAND: &str = "Unknown command";
    pub const SERVER_BUSY: &str = "Server busy";
    pub const UNSUPPORTED_VERSION: &str = "Unsupported protocol version";
}

/// Classification of a response line by its prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Admitted,
    Released,
    Found,
    InvalidPatientId,
    NoBeds,
    CapacityExhausted,
    NotFound,
    UnknownCommand,
    Busy,
    UnsupportedVersion,
    Unrecognized,
}

impl ResponseKind {
    pub fn classify(message: &str) -> Self {
        const PREFIXES: &[(&str, ResponseKind)] = &[
            ("Admitted:", ResponseKind::Admitted),
            (lines::RELEASED, ResponseKind::Released),
            ("ID=", ResponseKind::Found),
            ("Invalid patient ID", ResponseKind::InvalidPatientId),
            ("No beds available", ResponseKind::NoBeds),
            ("Patient capacity exhausted", ResponseKind::CapacityExhausted),
            ("Patient not found", ResponseKind::NotFound),
            (lines::UNKNOWN_COMMAND, ResponseKind::UnknownCommand),
            (lines::SERVER_BUSY, ResponseKind::Busy),
            (lines::UNSUPPORTED_VERSION, ResponseKind::UnsupportedVersion),
        ];

        PREFIXES
            .iter()
            .find(|(prefix, _)| message.starts_with(prefix))
            .map(|(_, kind)| *kind)
            .unwrap_or(ResponseKind::Unrecognized)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Admitted | Self::Released | Self::Found)
    }
}
