pub mod http;
pub mod sse;
pub mod subscriber;
pub mod wire;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::future::Future;
use std::time::Duration;

use crate::common::UploadError;
use crate::progress::JobId;
use crate::transfer::{ProgressCallback, UploadFile};

pub use http::HttpApi;
pub use subscriber::{RemotePhaseSubscriber, StreamSignal, SubscriptionHandle};
pub use wire::{decode_event, JobSnapshot};

/// Raw event payloads of one job's progress stream
pub type EventStream = BoxStream<'static, Result<String, UploadError>>;

/// The two server calls the engine depends on
#[async_trait]
pub trait UploadApi: Send + Sync + 'static {
    /// Send the file and return the job id the server assigned.
    /// `on_progress` is called with `(bytes_sent, bytes_total)` as the body goes out.
    async fn upload(
        &self,
        file: &UploadFile,
        on_progress: ProgressCallback,
    ) -> Result<JobId, UploadError>;

    /// Open the progress stream for `job_id`
    async fn subscribe(&self, job_id: &JobId) -> Result<EventStream, UploadError>;
}

pub(crate) async fn with_idle_timeout<F, T>(
    idle: Option<Duration>,
    future: F,
) -> Result<T, tokio::time::error::Elapsed>
where
    F: Future<Output = T>,
{
    match idle {
        Some(duration) => with_timeout(duration, future).await,
        None => Ok(future.await),
    }
}

async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T, tokio::time::error::Elapsed>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future).await
}
