#![doc = "Corpus upload client: replace-if-exists uploads with bounded retry against the managed retrieval corpus API."]
//
//! # Corpus upload
//!
//! This module bridges the [`CorpusUploader`] trait to the corpus HTTP
//! API. The low-level surface is the [`CorpusApi`] trait (list, delete,
//! multipart upload), implemented for real use by [`HttpCorpusApi`] and by
//! mocks in tests. [`CorpusClient`] layers the replace-if-exists flow and
//! the transient-error retry policy on top.
//!
//! ## Error classes
//! Transient failures (HTTP 408/429/5xx and transport errors) are retried
//! with exponential backoff up to [`RetryPolicy::max_attempts`]; everything
//! else is permanent and surfaces immediately.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::config::CorpusConfig;
use crate::contract::CorpusUploader;

/// Description attached to every uploaded artifact.
const UPLOAD_DESCRIPTION: &str = "Uploaded via corpus-loader";

#[derive(Debug, Error)]
pub enum UploadError {
    /// Worth retrying: timeouts, rate limits, server-side failures.
    #[error("transient upload failure: {message}")]
    Transient { message: String },
    /// Not worth retrying: the request itself is wrong or rejected.
    #[error("permanent upload failure: {message}")]
    Permanent { message: String },
}

impl UploadError {
    pub fn is_transient(&self) -> bool {
        matches!(self, UploadError::Transient { .. })
    }

    /// Classifies an HTTP error status. 408, 429 and 5xx are transient;
    /// other 4xx are permanent.
    pub fn from_status(status: reqwest::StatusCode, url: &str) -> Self {
        let message = format!("{url} returned {status}");
        if status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
        {
            UploadError::Transient { message }
        } else {
            UploadError::Permanent { message }
        }
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        let message = e.to_string();
        if e.is_builder() || e.is_decode() {
            UploadError::Permanent { message }
        } else {
            UploadError::Transient { message }
        }
    }
}

/// One stored corpus artifact, as reported by the service.
#[derive(Debug, Clone)]
pub struct CorpusFile {
    /// Opaque service resource name, e.g. `corpora/docs/files/123`.
    pub resource_name: String,
    pub display_name: String,
}

/// Low-level corpus API surface.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CorpusApi: Send + Sync {
    async fn list_files(&self) -> Result<Vec<CorpusFile>, UploadError>;
    async fn delete_file(&self, resource_name: &str) -> Result<(), UploadError>;
    async fn upload_file(
        &self,
        display_name: &str,
        local_path: &Path,
    ) -> Result<CorpusFile, UploadError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilePayload {
    name: String,
    #[serde(default)]
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct ListFilesResponse {
    #[serde(default)]
    files: Vec<FilePayload>,
}

impl From<FilePayload> for CorpusFile {
    fn from(payload: FilePayload) -> Self {
        CorpusFile {
            resource_name: payload.name,
            display_name: payload.display_name,
        }
    }
}

/// Real HTTP client for the corpus service.
pub struct HttpCorpusApi {
    http: reqwest::Client,
    base_url: String,
    corpus_name: String,
    api_key: String,
}

impl HttpCorpusApi {
    pub fn new(config: &CorpusConfig) -> Self {
        HttpCorpusApi {
            http: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            corpus_name: config.corpus_name.clone(),
            api_key: config.api_key.clone(),
        }
    }

    fn files_url(&self) -> String {
        format!(
            "{}/v1/corpora/{}/files",
            self.base_url, self.corpus_name
        )
    }
}

#[async_trait]
impl CorpusApi for HttpCorpusApi {
    async fn list_files(&self) -> Result<Vec<CorpusFile>, UploadError> {
        let url = self.files_url();
        tracing::info!(corpus = %self.corpus_name, "Listing corpus files");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            tracing::error!(status = %status, url = %url, "Corpus list request failed");
            return Err(UploadError::from_status(status, &url));
        }
        let listing = response.json::<ListFilesResponse>().await?;
        tracing::info!(count = listing.files.len(), "Fetched corpus file listing");
        Ok(listing.files.into_iter().map(CorpusFile::from).collect())
    }

    async fn delete_file(&self, resource_name: &str) -> Result<(), UploadError> {
        let url = format!("{}/v1/{}", self.base_url, resource_name);
        tracing::info!(resource = %resource_name, "Deleting corpus file");
        let response = self
            .http
            .delete(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            tracing::error!(status = %status, resource = %resource_name, "Corpus delete request failed");
            return Err(UploadError::from_status(status, &url));
        }
        Ok(())
    }

    async fn upload_file(
        &self,
        display_name: &str,
        local_path: &Path,
    ) -> Result<CorpusFile, UploadError> {
        let url = self.files_url();
        tracing::info!(
            display_name = %display_name,
            path = %local_path.display(),
            "Uploading corpus file"
        );

        let bytes = std::fs::read(local_path).map_err(|e| UploadError::Permanent {
            message: format!("failed to read artifact {}: {e}", local_path.display()),
        })?;
        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| display_name.to_string());
        let form = reqwest::multipart::Form::new()
            .text("displayName", display_name.to_string())
            .text("description", UPLOAD_DESCRIPTION.to_string())
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            tracing::error!(status = %status, display_name = %display_name, "Corpus upload request failed");
            return Err(UploadError::from_status(status, &url));
        }
        let payload = response.json::<FilePayload>().await?;
        tracing::info!(resource = %payload.name, "Corpus upload accepted");
        Ok(payload.into())
    }
}

/// Bounded exponential backoff for transient upload failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given attempt (1-based; the first attempt has no
    /// delay).
    fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let delay = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(exponent as i32);
        Duration::from_millis(delay as u64).min(self.max_delay)
    }
}

/// The [`CorpusUploader`] implementation: replace-if-exists over a
/// [`CorpusApi`], with retry on transient failures.
pub struct CorpusClient<A: CorpusApi> {
    api: A,
    retry: RetryPolicy,
}

impl<A: CorpusApi> CorpusClient<A> {
    pub fn new(api: A) -> Self {
        CorpusClient {
            api,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(api: A, retry: RetryPolicy) -> Self {
        CorpusClient { api, retry }
    }

    async fn retrying<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, UploadError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, UploadError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        operation = operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient corpus failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        operation = operation,
                        attempt,
                        error = %e,
                        "Corpus operation failed"
                    );
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait]
impl<A: CorpusApi> CorpusUploader for CorpusClient<A> {
    async fn upload(
        &self,
        display_name: &str,
        local_path: &Path,
    ) -> Result<String, UploadError> {
        tracing::info!(display_name = %display_name, "Checking corpus for existing artifact");
        let files = self.retrying("list_files", || self.api.list_files()).await?;

        for existing in files.iter().filter(|f| f.display_name == display_name) {
            tracing::info!(
                display_name = %display_name,
                resource = %existing.resource_name,
                "Replacing existing corpus artifact"
            );
            self.retrying("delete_file", || {
                self.api.delete_file(&existing.resource_name)
            })
            .await?;
        }

        let uploaded = self
            .retrying("upload_file", || {
                self.api.upload_file(display_name, local_path)
            })
            .await?;
        tracing::info!(
            display_name = %display_name,
            resource = %uploaded.resource_name,
            "Corpus artifact stored"
        );
        Ok(uploaded.resource_name)
    }
}
