//! reqwest-backed client for the import service.

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, StatusCode};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use super::sse::sse_payloads;
use super::wire::{error_message, JobSnapshot, UploadAccepted};
use super::{EventStream, UploadApi};
use crate::common::{EngineConfig, UploadError};
use crate::progress::JobId;
use crate::transfer::{ProgressCallback, TransferTracker, UploadFile};

#[derive(Clone)]
pub struct HttpApi {
    client: Client,
    config: EngineConfig,
}

impl HttpApi {
    pub fn new(config: EngineConfig) -> Result<Self, UploadError> {
        // no request timeout: the progress stream is long-lived
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| UploadError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// One-shot status poll, independent of any session
    pub async fn job_status(&self, job_id: &JobId) -> Result<JobSnapshot, UploadError> {
        let url = self.config.status_url(job_id.as_str());
        tracing::debug!(%url, "fetching job status");

        let response = self
            .client
            .get(&url)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Transport(describe_failure(status, &body)));
        }

        response
            .json::<JobSnapshot>()
            .await
            .map_err(|e| UploadError::Transport(format!("invalid status response: {}", e)))
    }
}

#[async_trait]
impl UploadApi for HttpApi {
    async fn upload(
        &self,
        file: &UploadFile,
        on_progress: ProgressCallback,
    ) -> Result<JobId, UploadError> {
        let handle = tokio::fs::File::open(&file.path).await.map_err(|e| {
            UploadError::Transport(format!("cannot read {}: {}", file.path.display(), e))
        })?;

        // Body bytes are counted as reqwest pulls them from the reader
        let tracker = Arc::new(TransferTracker::new(file.size, on_progress));
        let body = ReaderStream::new(handle).inspect_ok(move |chunk| {
            tracker.advance(chunk.len() as u64);
        });

        let part = Part::stream_with_length(Body::wrap_stream(body), file.size)
            .file_name(file.file_name.clone())
            .mime_str("text/csv")
            .map_err(|e| UploadError::Transport(e.to_string()))?;
        let form = Form::new().part(self.config.upload_field.clone(), part);

        let url = self.config.upload_url();
        tracing::info!(%url, file = %file.file_name, bytes = file.size, "uploading");

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Transport(describe_failure(status, &body)));
        }

        let accepted: UploadAccepted = response
            .json()
            .await
            .map_err(|e| UploadError::Transport(format!("invalid upload response: {}", e)))?;

        tracing::info!(job_id = %accepted.job_id, message = ?accepted.message, "upload accepted");
        Ok(JobId::new(accepted.job_id))
    }

    async fn subscribe(&self, job_id: &JobId) -> Result<EventStream, UploadError> {
        let url = self.config.progress_url(job_id.as_str());
        tracing::debug!(%url, "opening progress stream");

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| UploadError::StreamTransport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::StreamTransport(describe_failure(status, &body)));
        }

        Ok(sse_payloads(response.bytes_stream()))
    }
}

fn describe_failure(status: StatusCode, body: &str) -> String {
    match error_message(body) {
        Some(msg) => msg,
        None => format!("server returned {}", status),
    }
}
