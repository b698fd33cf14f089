//! Query embedding.
//!
//! A semantic search turns the user's query into a vector before the
//! retrieval backend sees it. [`EmbeddingProvider`] is the seam; the
//! orchestrator never knows which implementation it holds.
//!
//! - [`DisabledProvider`] fails every call. Search turns then fail with a
//!   retrieval error and the user's input is restored.
//! - [`OpenAIProvider`] posts to an OpenAI-compatible `/embeddings` endpoint.
//!
//! Transient failures (HTTP 429, 5xx, transport errors) are retried up to
//! `embedding.max_retries` times with a doubling delay starting at one
//! second and capped at 32 seconds. Any other 4xx fails on the spot.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;

/// Converts a text query into a vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model_name(&self) -> &str;
    /// Expected vector length.
    fn dims(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        bail!("Embedding provider is disabled; set [embedding].provider to enable search")
    }
}

/// Embedding provider backed by an OpenAI-compatible API.
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

/// What one HTTP attempt produced.
enum Attempt {
    Done(Vec<f32>),
    Transient(anyhow::Error),
}

impl OpenAIProvider {
    /// Build a provider with the key from `OPENAI_API_KEY`.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY must be set for the openai embedding provider"))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &EmbeddingConfig, api_key: impl Into<String>) -> Result<Self> {
        let (Some(model), Some(dims)) = (config.model.clone(), config.dims) else {
            bail!("embedding.model and embedding.dims are required for the openai provider");
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: format!("{}/embeddings", config.url.trim_end_matches('/')),
            model,
            dims,
            max_retries: config.max_retries,
        })
    }

    async fn attempt(&self, text: &str) -> Result<Attempt> {
        let sent = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "model": self.model, "input": text }))
            .send()
            .await;

        let response = match sent {
            Ok(r) => r,
            Err(e) => return Ok(Attempt::Transient(e.into())),
        };

        let status = response.status();
        if status.is_success() {
            let parsed: EmbeddingResponse = response.json().await?;
            let vector = parsed
                .data
                .into_iter()
                .next()
                .map(|item| item.embedding)
                .ok_or_else(|| anyhow!("embeddings response contained no vectors"))?;
            return Ok(Attempt::Done(vector));
        }

        let detail = response.text().await.unwrap_or_default();
        let err = anyhow!("Embedding API error {}: {}", status, detail);
        if status.as_u16() == 429 || status.is_server_error() {
            Ok(Attempt::Transient(err))
        } else {
            Err(err)
        }
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.saturating_sub(1).min(5))
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut attempt = 0;
        loop {
            match self.attempt(text).await? {
                Attempt::Done(vector) => {
                    if vector.len() != self.dims {
                        warn!(
                            expected = self.dims,
                            got = vector.len(),
                            "embedding length differs from embedding.dims"
                        );
                    }
                    debug!(model = %self.model, dims = vector.len(), "embedded query");
                    return Ok(vector);
                }
                Attempt::Transient(err) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(error = %err, attempt, "embedding request failed, retrying");
                    tokio::time::sleep(backoff(attempt)).await;
                }
                Attempt::Transient(err) => return Err(err),
            }
        }
    }
}

/// Build the provider named by `[embedding].provider`.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "openai" => Ok(Box::new(OpenAIProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}
