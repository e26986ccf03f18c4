pub mod reconcile;
pub mod smoothing;
pub mod types;

pub use reconcile::{map_job_percent, phase_for, reconcile, server_failure, TRANSFER_CEILING};
pub use smoothing::DisplaySmoother;
pub use types::{DisplayState, JobId, PhaseLabel, ProgressEvent, SessionStatus, Signal};
