use tokio_util::sync::CancellationToken;

use crate::common::UploadError;
use crate::progress::{DisplayState, JobId};
use crate::transport::SubscriptionHandle;

/// Set once when the job reports completion, never cleared.
/// Stream closures and errors seen after that are benign.
#[derive(Debug, Default)]
pub struct CompletionLatch(bool);

impl CompletionLatch {
    /// Returns true only on the first call
    pub fn set(&mut self) -> bool {
        let first = !self.0;
        self.0 = true;
        first
    }

    pub fn is_set(&self) -> bool {
        self.0
    }
}

/// Everything one upload session owns.
///
/// `generation` identifies the session; callbacks capture it when spawned
/// and are ignored once it moves on. `cancel` stops the simulator, the
/// in-flight upload and the settle timer together.
#[derive(Debug)]
pub struct Session {
    pub(crate) generation: u64,
    pub(crate) job_id: Option<JobId>,
    pub(crate) display: DisplayState,
    pub(crate) subscription: Option<SubscriptionHandle>,
    pub(crate) completed: CompletionLatch,
    pub(crate) failure: Option<UploadError>,
    pub(crate) cancel: CancellationToken,
}

impl Session {
    pub fn idle(generation: u64) -> Self {
        Self {
            generation,
            job_id: None,
            display: DisplayState::default(),
            subscription: None,
            completed: CompletionLatch::default(),
            failure: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn begin(generation: u64) -> Self {
        Self {
            display: DisplayState::uploading(),
            ..Self::idle(generation)
        }
    }

    #[cfg(test)]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[cfg(test)]
    pub fn display(&self) -> &DisplayState {
        &self.display
    }

    #[cfg(test)]
    pub fn job_id(&self) -> Option<&JobId> {
        self.job_id.as_ref()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Close and release the stream handle. Safe to call repeatedly.
    pub fn close_subscription(&mut self) -> bool {
        match self.subscription.take() {
            Some(handle) => handle.close(),
            None => false,
        }
    }

    /// Stop every task tied to this session and close the stream
    pub fn teardown(&mut self) {
        self.cancel.cancel();
        self.close_subscription();
    }
}
