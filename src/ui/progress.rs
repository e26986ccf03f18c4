use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::sync::watch;

use crate::progress::{DisplaySmoother, DisplayState, SessionStatus};

/// Terminal progress bar for one upload session
pub struct ProgressView {
    bar: ProgressBar,
    smoother: DisplaySmoother,
}

impl ProgressView {
    pub fn new(file_name: &str) -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template(
                "{prefix:.bold} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
        );
        bar.set_prefix(file_name.to_string());
        Self {
            bar,
            smoother: DisplaySmoother::new(),
        }
    }

    /// Hidden bar, for non-interactive output and tests
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            smoother: DisplaySmoother::new(),
        }
    }

    /// Advance one animation tick toward `state`
    pub fn render(&mut self, state: &DisplayState) -> u8 {
        let shown = self.smoother.tick(state.overall_percent);
        self.bar.set_position(u64::from(shown));
        self.bar.set_message(status_line(state));
        shown
    }

    pub fn caught_up(&self, state: &DisplayState) -> bool {
        self.smoother.is_caught_up(state.overall_percent)
    }

    pub fn finish(&self, state: &DisplayState) {
        match state.status {
            SessionStatus::Completed => self.bar.finish_with_message(status_line(state)),
            _ => self.bar.abandon_with_message(status_line(state)),
        }
    }
}

/// Short label shown next to the bar
pub fn status_line(state: &DisplayState) -> String {
    match state.status {
        SessionStatus::Idle => "Waiting".to_string(),
        SessionStatus::Error => format!(
            "Error: {}",
            state.error_message.as_deref().unwrap_or("unknown error")
        ),
        SessionStatus::Cancelled => "Cancelled".to_string(),
        _ => state.phase.to_string(),
    }
}

/// Drive `view` from the controller's display channel until the session
/// ends. Returns the last non-idle state observed.
pub async fn watch_session(
    mut rx: watch::Receiver<DisplayState>,
    tick: Duration,
    mut view: ProgressView,
) -> DisplayState {
    let mut ticker = tokio::time::interval(tick);
    let mut last = rx.borrow().clone();

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {}
        }

        let state = rx.borrow_and_update().clone();
        if state.status == SessionStatus::Idle && last.status != SessionStatus::Idle {
            // reset after settle or cancel; keep the last real state
            break;
        }
        last = state;
        view.render(&last);

        if last.status.is_terminal() && (last.status != SessionStatus::Completed || view.caught_up(&last)) {
            break;
        }
    }

    view.finish(&last);
    last
}
