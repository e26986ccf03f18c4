use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::common::{DecodeError, UploadError};

/// Opaque identifier of one server-side import job
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Import phases in their only legal forward order
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PhaseLabel {
    Uploading,
    Processing,
    ParsingCsv,
    Validating,
    Importing,
    Completed,
    Error,
}

impl PhaseLabel {
    /// Wire spelling used by the progress stream
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseLabel::Uploading => "Uploading",
            PhaseLabel::Processing => "Processing",
            PhaseLabel::ParsingCsv => "Parsing CSV",
            PhaseLabel::Validating => "Validating",
            PhaseLabel::Importing => "Importing",
            PhaseLabel::Completed => "Completed",
            PhaseLabel::Error => "Error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PhaseLabel::Completed | PhaseLabel::Error)
    }
}

impl fmt::Display for PhaseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhaseLabel {
    type Err = DecodeError;

    /// Exact, case-sensitive labels. Worker-style decorations are tolerated:
    /// a trailing "..." and the "Processing batch N (x/y)" progress label.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let label = raw.trim().trim_end_matches("...").trim_end_matches('…');

        let phase = match label {
            "Uploading" => PhaseLabel::Uploading,
            "Processing" => PhaseLabel::Processing,
            "Parsing CSV" => PhaseLabel::ParsingCsv,
            "Validating" => PhaseLabel::Validating,
            "Importing" => PhaseLabel::Importing,
            "Completed" => PhaseLabel::Completed,
            "Error" => PhaseLabel::Error,
            other if other.starts_with("Processing batch") => PhaseLabel::Processing,
            _ => return Err(DecodeError::UnknownStatus(raw.to_string())),
        };
        Ok(phase)
    }
}

/// One decoded message from the progress stream.
/// `percent` is on the server's own 0-100 scale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgressEvent {
    pub phase: PhaseLabel,
    pub percent: u8,
    pub error: Option<String>,
}

impl ProgressEvent {
    pub fn new(phase: PhaseLabel, percent: u8) -> Self {
        Self {
            phase,
            percent: percent.min(100),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            phase: PhaseLabel::Error,
            percent: 0,
            error: Some(message.into()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.error.is_some() || self.phase.is_terminal()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Idle,
    Uploading,
    Streaming,
    Completed,
    Error,
    Cancelled,
}

impl SessionStatus {
    /// Uploading or streaming; a second `start()` is refused
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Uploading | SessionStatus::Streaming)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Error | SessionStatus::Cancelled
        )
    }
}

/// UI-facing view of a session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayState {
    pub overall_percent: u8,
    pub phase: PhaseLabel,
    pub status: SessionStatus,
    pub error_message: Option<String>,
}

impl DisplayState {
    /// Fresh state for a newly started session
    pub fn uploading() -> Self {
        Self {
            status: SessionStatus::Uploading,
            ..Self::default()
        }
    }
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            overall_percent: 0,
            phase: PhaseLabel::Uploading,
            status: SessionStatus::Idle,
            error_message: None,
        }
    }
}

/// Everything the reconciler can be fed
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Signal {
    /// Local simulator trickle, already on the 0-30 band
    Simulated(u8),
    /// Byte-level transfer progress, already on the 0-30 band
    Transfer(u8),
    /// Decoded stream event, job-relative percent
    Stream(ProgressEvent),
    /// Upload or stream transport failure
    Fault(UploadError),
}
