//! Reserved chat commands that trigger jobs on the document backend.
//!
//! `run ingestion` starts a background ingestion of every uploaded file;
//! `run score test` runs the backend's retrieval scoring check. Both are
//! fire-and-forget from the chat's point of view: a 2xx means the backend
//! accepted the job.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use crate::config::BackendConfig;

#[async_trait]
pub trait BackendCommands: Send + Sync {
    /// Ask the backend to (re)ingest all documents.
    async fn trigger_ingestion(&self) -> Result<String>;
    /// Run the backend's score test.
    async fn run_score_test(&self) -> Result<String>;
}

/// HTTP implementation of [`BackendCommands`].
pub struct HttpBackendCommands {
    client: reqwest::Client,
    base_url: String,
    ingest_path: String,
    score_test_path: String,
}

impl HttpBackendCommands {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            ingest_path: config.ingest_path.clone(),
            score_test_path: config.score_test_path.clone(),
        })
    }

    async fn post_empty(&self, path: &str) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        info!(%url, %status, "backend command finished");
        if !status.is_success() {
            bail!("backend returned {}: {}", status, body.trim());
        }
        Ok(body)
    }
}

#[async_trait]
impl BackendCommands for HttpBackendCommands {
    async fn trigger_ingestion(&self) -> Result<String> {
        self.post_empty(&self.ingest_path).await
    }

    async fn run_score_test(&self) -> Result<String> {
        self.post_empty(&self.score_test_path).await
    }
}
