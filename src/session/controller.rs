//! Owns the single upload session and wires every progress source into it.
//!
//! All mutation goes through `Inner::session` under one lock. Sources run as
//! tokio tasks that capture the session generation when spawned; anything
//! they deliver after the generation moves on is dropped before reaching the
//! reconciler.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::state::Session;
use crate::common::{EngineConfig, UploadError};
use crate::progress::{reconcile, server_failure, DisplayState, JobId, SessionStatus, Signal};
use crate::transfer::{transfer_percent, LocalPhaseSimulator, ProgressCallback, UploadFile};
use crate::transport::{RemotePhaseSubscriber, StreamSignal, UploadApi};

pub struct SessionController<A: UploadApi> {
    inner: Arc<Inner<A>>,
}

impl<A: UploadApi> Clone for SessionController<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<A: UploadApi> {
    api: Arc<A>,
    config: EngineConfig,
    session: Mutex<Session>,
    display_tx: watch::Sender<DisplayState>,
}

impl<A: UploadApi> SessionController<A> {
    pub fn new(api: Arc<A>, config: EngineConfig) -> Self {
        let (display_tx, _) = watch::channel(DisplayState::default());
        Self {
            inner: Arc::new(Inner {
                api,
                config,
                session: Mutex::new(Session::idle(0)),
                display_tx,
            }),
        }
    }

    /// Receiver that observes every published `DisplayState`
    pub fn subscribe(&self) -> watch::Receiver<DisplayState> {
        self.inner.display_tx.subscribe()
    }

    pub fn display(&self) -> DisplayState {
        self.inner.session.lock().display.clone()
    }

    pub fn job_id(&self) -> Option<JobId> {
        self.inner.session.lock().job_id.clone()
    }

    /// The failure behind the current `Error` state
    pub fn last_error(&self) -> Option<UploadError> {
        self.inner.session.lock().failure.clone()
    }

    /// Whether a progress stream handle is currently held
    pub fn is_subscribed(&self) -> bool {
        self.inner.session.lock().is_subscribed()
    }

    /// Begin a new session for `file`. Must be called inside a tokio runtime.
    /// Returns the new session's generation.
    pub fn start(&self, file: Option<UploadFile>) -> Result<u64, UploadError> {
        let file =
            file.ok_or_else(|| UploadError::InvalidInput("no file selected".to_string()))?;

        let mut session = self.inner.session.lock();
        let status = session.display.status;
        if status.is_active() {
            tracing::warn!(?status, "start rejected: session already active");
            return Err(UploadError::SessionActive);
        }
        if status == SessionStatus::Error {
            return Err(UploadError::UnacknowledgedError);
        }

        // a Completed session may still have its settle timer pending
        session.teardown();
        let generation = session.generation + 1;
        *session = Session::begin(generation);
        let token = session.cancel.clone();
        self.inner.publish(&session);
        drop(session);

        tracing::info!(generation, file = %file.file_name, bytes = file.size, "upload session started");
        self.inner.spawn_transfer(generation, token, file);
        Ok(generation)
    }

    /// Abandon the current session and return to `Idle` immediately.
    /// The server-side job is not told to stop.
    /// Returns true if an uploading or streaming session was cancelled.
    pub fn cancel(&self) -> bool {
        let mut session = self.inner.session.lock();
        let status = session.display.status;
        if status == SessionStatus::Idle {
            return false;
        }

        session.teardown();
        let was_active = status.is_active();
        if was_active {
            session.display.status = SessionStatus::Cancelled;
            self.inner.publish(&session);
            tracing::info!(
                generation = session.generation,
                job_id = ?session.job_id,
                "upload session cancelled; server job left running"
            );
        }
        self.inner.reset_idle(&mut session);
        was_active
    }

    /// Dismiss a failed session so a new one can start
    pub fn acknowledge(&self) -> bool {
        let mut session = self.inner.session.lock();
        if session.display.status != SessionStatus::Error {
            return false;
        }
        self.inner.reset_idle(&mut session);
        true
    }

    /// Keep-alive guard for a view. Dropping it tears the session down.
    pub fn mount(&self) -> MountGuard<A> {
        MountGuard {
            controller: self.clone(),
        }
    }
}

/// Ties a session to whatever keeps it on screen. On drop the stream
/// handle is closed and pending tasks stop.
pub struct MountGuard<A: UploadApi> {
    controller: SessionController<A>,
}

impl<A: UploadApi> Drop for MountGuard<A> {
    fn drop(&mut self) {
        if self.controller.cancel() {
            tracing::debug!("session torn down on unmount");
        }
    }
}

impl<A: UploadApi> Inner<A> {
    fn publish(&self, session: &Session) {
        self.display_tx.send_replace(session.display.clone());
    }

    fn reset_idle(&self, session: &mut Session) {
        session.teardown();
        *session = Session::idle(session.generation + 1);
        self.publish(session);
    }

    fn spawn_transfer(self: &Arc<Self>, generation: u64, token: CancellationToken, file: UploadFile) {
        let inner = Arc::clone(self);

        tokio::spawn(async move {
            let sim_stop = token.child_token();
            let simulator = LocalPhaseSimulator::new(
                inner.config.simulator_tick(),
                inner.config.simulator_max_step,
            );
            let sim_inner = Arc::clone(&inner);
            tokio::spawn(simulator.run(sim_stop.clone(), move |percent| {
                sim_inner.apply(generation, Signal::Simulated(percent));
            }));

            // real byte progress supersedes the simulator
            let progress_inner = Arc::clone(&inner);
            let progress_stop = sim_stop.clone();
            let on_progress: ProgressCallback = Arc::new(move |sent: u64, total: u64| {
                progress_stop.cancel();
                progress_inner.apply(generation, Signal::Transfer(transfer_percent(sent, total)));
            });

            let result = tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(generation, "upload abandoned");
                    return;
                }
                result = inner.api.upload(&file, on_progress) => result,
            };
            sim_stop.cancel();

            match result {
                Ok(job_id) => inner.begin_streaming(generation, job_id),
                Err(e) => {
                    tracing::error!(generation, error = %e, "upload failed");
                    inner.apply(generation, Signal::Fault(e));
                }
            }
        });
    }

    fn begin_streaming(self: &Arc<Self>, generation: u64, job_id: JobId) {
        let mut session = self.session.lock();
        if session.generation != generation || session.display.status != SessionStatus::Uploading {
            tracing::debug!(generation, %job_id, "job accepted for a stale session");
            return;
        }

        tracing::info!(generation, %job_id, "job accepted, streaming progress");
        session.job_id = Some(job_id.clone());
        session.display.status = SessionStatus::Streaming;
        self.publish(&session);

        let inner = Arc::clone(self);
        let subscriber =
            RemotePhaseSubscriber::new(self.api.clone(), self.config.stream_idle_timeout());
        let handle = subscriber.open(job_id, move |signal| {
            inner.on_stream_signal(generation, signal);
        });
        session.subscription = Some(handle);
    }

    fn apply(self: &Arc<Self>, generation: u64, signal: Signal) {
        let mut session = self.session.lock();
        if session.generation != generation {
            tracing::debug!(generation, current = session.generation, ?signal, "dropping stale signal");
            return;
        }
        self.transition(&mut session, signal);
    }

    fn on_stream_signal(self: &Arc<Self>, generation: u64, signal: StreamSignal) {
        let mut session = self.session.lock();
        if session.generation != generation {
            tracing::debug!(generation, current = session.generation, ?signal, "dropping stale stream signal");
            return;
        }

        match signal {
            StreamSignal::Event(event) => self.transition(&mut session, Signal::Stream(event)),
            StreamSignal::TerminalClose => {
                if session.completed.is_set() || session.display.status.is_terminal() {
                    session.close_subscription();
                    return;
                }
                let err =
                    UploadError::StreamTransport("stream closed before the job finished".to_string());
                self.transition(&mut session, Signal::Fault(err));
            }
            StreamSignal::TransportError(detail) => {
                if session.completed.is_set() {
                    tracing::warn!(generation, error = %detail, "ignoring stream error after completion");
                    session.close_subscription();
                    return;
                }
                let err = UploadError::StreamTransport(detail);
                self.transition(&mut session, Signal::Fault(err));
            }
        }
    }

    fn transition(self: &Arc<Self>, session: &mut Session, signal: Signal) {
        let next = reconcile(&session.display, &signal);
        if next == session.display {
            return;
        }

        let failure = match &signal {
            Signal::Fault(err) => Some(err.clone()),
            Signal::Stream(event) => server_failure(event),
            _ => None,
        };

        let previous = session.display.status;
        session.display = next;

        if previous != session.display.status {
            match session.display.status {
                SessionStatus::Completed => {
                    session.completed.set();
                    session.close_subscription();
                    tracing::info!(generation = session.generation, job_id = ?session.job_id, "import completed");
                    self.schedule_settle(session.generation, session.cancel.clone());
                }
                SessionStatus::Error => {
                    session.close_subscription();
                    session.failure = failure;
                    tracing::error!(
                        generation = session.generation,
                        job_id = ?session.job_id,
                        error = ?session.failure,
                        "upload session failed"
                    );
                }
                _ => {}
            }
        }

        self.publish(session);
    }

    fn schedule_settle(self: &Arc<Self>, generation: u64, token: CancellationToken) {
        let inner = Arc::clone(self);
        let delay = self.config.settle_delay();

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            let mut session = inner.session.lock();
            if session.generation == generation && session.display.status == SessionStatus::Completed {
                tracing::debug!(generation, "settle delay elapsed, resetting");
                inner.reset_idle(&mut session);
            }
        });
    }
}
