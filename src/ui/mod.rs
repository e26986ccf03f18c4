pub mod output;
pub mod progress;

pub use output::{spinner, spinner_error, spinner_success};
pub use progress::{status_line, watch_session, ProgressView};
