//! JSON bodies exchanged with the import service.

use serde::{Deserialize, Deserializer, Serialize};

use crate::common::DecodeError;
use crate::progress::{PhaseLabel, ProgressEvent};

/// One progress message as it appears on the stream
#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(default)]
    status: Option<String>,
    #[serde(default, deserialize_with = "lenient_percent")]
    progress: u8,
    #[serde(default)]
    error: Option<String>,
}

/// Decode one stream payload.
///
/// `error` wins over `status`: a payload carrying an error message is a
/// terminal failure even if its status label is missing or unrecognized.
pub fn decode_event(payload: &str) -> Result<ProgressEvent, DecodeError> {
    let wire: WireEvent = serde_json::from_str(payload)?;
    let error = wire.error.filter(|msg| !msg.trim().is_empty());

    let phase = match (wire.status.as_deref(), &error) {
        (None, None) => return Err(DecodeError::Empty),
        (None, Some(_)) => PhaseLabel::Error,
        (Some(label), Some(_)) => label.parse().unwrap_or(PhaseLabel::Error),
        (Some(label), None) => label.parse()?,
    };

    Ok(ProgressEvent {
        phase,
        percent: wire.progress,
        error,
    })
}

/// `202` body of the upload endpoint
#[derive(Debug, Deserialize)]
pub struct UploadAccepted {
    #[serde(alias = "task_id")]
    pub job_id: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// One-shot job state from the status endpoint
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "lenient_percent")]
    pub progress: u8,
    #[serde(default)]
    pub error: Option<String>,
}

impl JobSnapshot {
    /// Recognized phase, if the label is one
    pub fn phase(&self) -> Option<PhaseLabel> {
        self.status.parse().ok()
    }
}

/// Extract a human message from a 4xx/5xx body.
/// Accepts `{"error": "..."}` and `{"error": {"message": "..."}}`.
pub fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("error")? {
        serde_json::Value::String(msg) => Some(msg.clone()),
        serde_json::Value::Object(obj) => obj
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string),
        _ => None,
    }
}

// integers or floats, clamped to 0..=100; null counts as 0
fn lenient_percent<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<f64> = Option::deserialize(deserializer)?;
    Ok(raw.map(|p| p.clamp(0.0, 100.0).floor() as u8).unwrap_or(0))
}
