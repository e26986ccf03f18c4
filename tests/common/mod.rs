#![allow(dead_code)]

use async_trait::async_trait;
use catalogdrop::common::{EngineConfig, UploadError};
use catalogdrop::progress::{DisplayState, JobId};
use catalogdrop::transfer::{ProgressCallback, UploadFile};
use catalogdrop::transport::{EventStream, UploadApi};
use futures::channel::mpsc;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{oneshot, watch};

pub const WAIT: Duration = Duration::from_secs(5);

/// Timers long enough to never fire unless a test shortens them
pub fn test_config() -> EngineConfig {
    EngineConfig {
        simulator_tick_ms: 3_600_000,
        settle_delay_ms: 3_600_000,
        stream_idle_timeout_secs: None,
        ..EngineConfig::default()
    }
}

pub fn csv_file(size: u64) -> UploadFile {
    UploadFile {
        path: PathBuf::from("products.csv"),
        file_name: "products.csv".to_string(),
        size,
    }
}

/// Test side of a `FakeApi`: decides the upload outcome and feeds the stream
pub struct FakeControl {
    outcome: Option<oneshot::Sender<Result<JobId, UploadError>>>,
    events: mpsc::UnboundedSender<Result<String, UploadError>>,
}

impl FakeControl {
    pub fn accept(&mut self, job_id: &str) {
        if let Some(tx) = self.outcome.take() {
            let _ = tx.send(Ok(JobId::new(job_id)));
        }
    }

    pub fn reject(&mut self, err: UploadError) {
        if let Some(tx) = self.outcome.take() {
            let _ = tx.send(Err(err));
        }
    }

    /// Push a raw payload; returns false once the subscriber is gone
    pub fn send(&self, payload: &str) -> bool {
        self.events.unbounded_send(Ok(payload.to_string())).is_ok()
    }

    pub fn fail_stream(&self, detail: &str) -> bool {
        self.events
            .unbounded_send(Err(UploadError::StreamTransport(detail.to_string())))
            .is_ok()
    }

    pub fn end_stream(&self) {
        self.events.close_channel();
    }
}

/// Scripted `UploadApi`: reports fixed byte progress, then waits for the
/// test to accept or reject; serves one channel-backed progress stream.
pub struct FakeApi {
    transfer: Vec<(u64, u64)>,
    outcome: Mutex<Option<oneshot::Receiver<Result<JobId, UploadError>>>>,
    events: Mutex<Option<mpsc::UnboundedReceiver<Result<String, UploadError>>>>,
    pub uploads: AtomicUsize,
    pub subscribes: AtomicUsize,
    pub stream_drops: Arc<AtomicUsize>,
}

impl FakeApi {
    pub fn new(transfer: Vec<(u64, u64)>) -> (Arc<Self>, FakeControl) {
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (events_tx, events_rx) = mpsc::unbounded();

        let api = Arc::new(Self {
            transfer,
            outcome: Mutex::new(Some(outcome_rx)),
            events: Mutex::new(Some(events_rx)),
            uploads: AtomicUsize::new(0),
            subscribes: AtomicUsize::new(0),
            stream_drops: Arc::new(AtomicUsize::new(0)),
        });
        let control = FakeControl {
            outcome: Some(outcome_tx),
            events: events_tx,
        };
        (api, control)
    }

    pub fn subscribes(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    pub fn stream_drops(&self) -> usize {
        self.stream_drops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UploadApi for FakeApi {
    async fn upload(
        &self,
        _file: &UploadFile,
        on_progress: ProgressCallback,
    ) -> Result<JobId, UploadError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        for (sent, total) in &self.transfer {
            on_progress(*sent, *total);
        }

        let outcome = self.outcome.lock().take();
        match outcome {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(UploadError::Transport("test dropped control".into()))),
            None => Err(UploadError::Transport("fake serves a single upload".into())),
        }
    }

    async fn subscribe(&self, _job_id: &JobId) -> Result<EventStream, UploadError> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        let events = self.events.lock().take();
        match events {
            Some(rx) => Ok(DropCounted {
                inner: rx,
                drops: self.stream_drops.clone(),
            }
            .boxed()),
            None => Err(UploadError::StreamTransport("fake serves a single stream".into())),
        }
    }
}

/// Counts how many times the engine released a stream
struct DropCounted<S> {
    inner: S,
    drops: Arc<AtomicUsize>,
}

impl<S: Stream + Unpin> Stream for DropCounted<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl<S> Drop for DropCounted<S> {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Wait until the published state satisfies `pred`
pub async fn wait_for<F>(rx: &mut watch::Receiver<DisplayState>, pred: F) -> DisplayState
where
    F: FnMut(&DisplayState) -> bool,
{
    let state = tokio::time::timeout(WAIT, rx.wait_for(pred))
        .await
        .expect("timed out waiting for display state")
        .expect("display channel closed");
    state.clone()
}

/// Poll `cond` until it holds or the wait budget runs out
pub async fn eventually<F>(mut cond: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
