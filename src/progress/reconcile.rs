//! Pure state transition from one `DisplayState` to the next.
//!
//! The overall percent is split into two bands: 0-30 belongs to the upload
//! itself (simulator and byte-level progress), 30-100 to the server job.
//! Callbacks from the different sources arrive in no guaranteed order, so
//! every transition clamps against the previous percent.

use super::types::{DisplayState, PhaseLabel, ProgressEvent, SessionStatus, Signal};
use crate::common::{UploadError, DEFAULT_SERVER_ERROR};

/// Upper bound of the upload band
pub const TRANSFER_CEILING: u8 = 30;

/// Width of the server job band
const JOB_BAND: u32 = 70;

/// Highest percent reachable without a `Completed` event
const PRE_COMPLETE_CAP: u8 = 99;

/// Map a job-relative percent into the 30-100 band
pub fn map_job_percent(job_percent: u8) -> u8 {
    let job_percent = u32::from(job_percent.min(100));
    TRANSFER_CEILING + (job_percent * JOB_BAND / 100) as u8
}

/// Phase shown for a blended percent
pub fn phase_for(overall_percent: u8) -> PhaseLabel {
    match overall_percent {
        0..=29 => PhaseLabel::Uploading,
        30..=49 => PhaseLabel::ParsingCsv,
        50..=79 => PhaseLabel::Validating,
        80..=99 => PhaseLabel::Importing,
        _ => PhaseLabel::Completed,
    }
}

/// Compute the next display state. Idle and terminal states absorb every signal.
pub fn reconcile(prev: &DisplayState, signal: &Signal) -> DisplayState {
    if prev.status == SessionStatus::Idle || prev.status.is_terminal() {
        return prev.clone();
    }

    match signal {
        Signal::Simulated(percent) | Signal::Transfer(percent) => upload_progress(prev, *percent),
        Signal::Stream(event) => stream_progress(prev, event),
        Signal::Fault(err) => failed(prev, err),
    }
}

fn upload_progress(prev: &DisplayState, percent: u8) -> DisplayState {
    // late upload callbacks after the stream opened carry no information
    if prev.status != SessionStatus::Uploading {
        return prev.clone();
    }

    DisplayState {
        overall_percent: percent.min(TRANSFER_CEILING).max(prev.overall_percent),
        phase: PhaseLabel::Uploading,
        status: SessionStatus::Uploading,
        error_message: None,
    }
}

fn stream_progress(prev: &DisplayState, event: &ProgressEvent) -> DisplayState {
    if let Some(err) = server_failure(event) {
        return failed(prev, &err);
    }

    if event.phase == PhaseLabel::Completed {
        return DisplayState {
            overall_percent: 100,
            phase: PhaseLabel::Completed,
            status: SessionStatus::Completed,
            error_message: None,
        };
    }

    let overall_percent = map_job_percent(event.percent)
        .max(prev.overall_percent)
        .min(PRE_COMPLETE_CAP);

    DisplayState {
        overall_percent,
        phase: phase_for(overall_percent),
        status: SessionStatus::Streaming,
        error_message: None,
    }
}

/// The failure a stream event reports, if any. A bare `Error` phase
/// without text falls back to `DEFAULT_SERVER_ERROR`.
pub fn server_failure(event: &ProgressEvent) -> Option<UploadError> {
    if event.error.is_none() && event.phase != PhaseLabel::Error {
        return None;
    }
    let message = event
        .error
        .clone()
        .unwrap_or_else(|| DEFAULT_SERVER_ERROR.to_string());
    Some(UploadError::ServerReported(message))
}

fn failed(prev: &DisplayState, err: &UploadError) -> DisplayState {
    DisplayState {
        overall_percent: prev.overall_percent,
        phase: PhaseLabel::Error,
        status: SessionStatus::Error,
        error_message: Some(err.display_message()),
    }
}
