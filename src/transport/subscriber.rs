//! One progress stream per job, decoded into `ProgressEvent`s.

use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{decode_event, with_idle_timeout, UploadApi};
use crate::progress::{JobId, ProgressEvent};

/// What the subscriber reports to its owner
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamSignal {
    Event(ProgressEvent),
    /// Server ended the stream normally
    TerminalClose,
    /// Stream could not be opened, failed mid-way, or went idle
    TransportError(String),
}

/// Owner's handle on an open stream. Closing is idempotent and also
/// happens on drop, so the stream never outlives its handle.
#[derive(Debug)]
pub struct SubscriptionHandle {
    job_id: JobId,
    token: CancellationToken,
    closed: AtomicBool,
}

impl SubscriptionHandle {
    /// Stop the stream. Returns false if it was already closed.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.token.cancel();
        tracing::debug!(job_id = %self.job_id, "progress stream closed");
        true
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

pub struct RemotePhaseSubscriber<A> {
    api: Arc<A>,
    idle_timeout: Option<Duration>,
}

impl<A: UploadApi> RemotePhaseSubscriber<A> {
    pub fn new(api: Arc<A>, idle_timeout: Option<Duration>) -> Self {
        Self { api, idle_timeout }
    }

    /// Spawn the reader task for `job_id`. Must be called inside a tokio runtime.
    ///
    /// Undecodable payloads are logged and dropped. After `TerminalClose` or
    /// `TransportError` nothing more is reported.
    pub fn open<F>(&self, job_id: JobId, on_signal: F) -> SubscriptionHandle
    where
        F: Fn(StreamSignal) + Send + Sync + 'static,
    {
        let token = CancellationToken::new();
        let api = self.api.clone();
        let idle = self.idle_timeout;
        let task_token = token.clone();
        let task_job = job_id.clone();

        tokio::spawn(async move {
            let opened = tokio::select! {
                _ = task_token.cancelled() => return,
                opened = api.subscribe(&task_job) => opened,
            };
            let mut stream = match opened {
                Ok(stream) => stream,
                Err(e) => {
                    if !task_token.is_cancelled() {
                        on_signal(StreamSignal::TransportError(e.detail()));
                    }
                    return;
                }
            };

            loop {
                let next = tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    next = with_idle_timeout(idle, stream.next()) => next,
                };

                match next {
                    Ok(Some(Ok(payload))) => match decode_event(&payload) {
                        Ok(event) => on_signal(StreamSignal::Event(event)),
                        Err(e) => {
                            tracing::warn!(job_id = %task_job, error = %e, payload = %payload, "dropping malformed progress payload");
                        }
                    },
                    Ok(Some(Err(e))) => {
                        on_signal(StreamSignal::TransportError(e.detail()));
                        break;
                    }
                    Ok(None) => {
                        on_signal(StreamSignal::TerminalClose);
                        break;
                    }
                    Err(_) => {
                        let secs = idle.map(|d| d.as_secs()).unwrap_or_default();
                        on_signal(StreamSignal::TransportError(format!(
                            "no progress received for {}s",
                            secs
                        )));
                        break;
                    }
                }
            }
            tracing::debug!(job_id = %task_job, "progress reader finished");
        });

        SubscriptionHandle {
            job_id,
            token,
            closed: AtomicBool::new(false),
        }
    }
}
