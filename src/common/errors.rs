use thiserror::Error;

/// Fallback shown when the server reports an error without a message
pub const DEFAULT_SERVER_ERROR: &str = "Upload failed";

/// Failures surfaced by the upload engine.
///
/// Every variant except `InvalidInput`, `SessionActive` and
/// `UnacknowledgedError` ends the session in `SessionStatus::Error`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// No usable file was supplied. Raised before any network call.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// `start()` while a session is already uploading or streaming
    #[error("An upload session is already active")]
    SessionActive,

    /// `start()` while the previous session's error has not been acknowledged
    #[error("Previous upload failed; acknowledge it before starting a new one")]
    UnacknowledgedError,

    /// Upload request failed before a job id was obtained
    #[error("Upload request failed: {0}")]
    Transport(String),

    /// Progress stream failed before a terminal event
    #[error("Progress stream failed: {0}")]
    StreamTransport(String),

    /// Terminal event carrying the server's own message
    #[error("{0}")]
    ServerReported(String),
}

impl UploadError {
    /// Text placed in `DisplayState::error_message`
    pub fn display_message(&self) -> String {
        match self {
            UploadError::ServerReported(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    /// The message without the variant prefix
    pub fn detail(&self) -> String {
        match self {
            UploadError::InvalidInput(msg)
            | UploadError::Transport(msg)
            | UploadError::StreamTransport(msg)
            | UploadError::ServerReported(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    /// Surfaced failures the caller may retry after acknowledging
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UploadError::Transport(_)
                | UploadError::StreamTransport(_)
                | UploadError::ServerReported(_)
        )
    }
}

/// A progress payload that could not be decoded.
/// Logged and dropped by the subscriber, never surfaced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    Json(String),

    #[error("unrecognized status label: {0:?}")]
    UnknownStatus(String),

    #[error("payload has neither status nor error")]
    Empty,
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        DecodeError::Json(err.to_string())
    }
}
