//! Retrieval gateway to the external document search service.
//!
//! The gateway is a thin client: it sends a query embedding, the requesting
//! user id, and the optional [`FilterSet`] to `POST {backend}/file_ops/search_docs`
//! and returns the chunks in the order the backend ranked them. Ranking
//! happens out of process.
//!
//! Callers cap the number of chunks injected into a prompt with
//! [`cap_chunks`], which applies a stable score-descending sort before
//! truncating to `top_k`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::BackendConfig;
use crate::error::RetrievalError;
use crate::filters::FilterSet;
use crate::models::RetrievedChunk;

/// Inputs for a single search invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub embedding: Vec<f32>,
    /// Scopes every search to one user. Never empty.
    user_id: String,
    pub filters: FilterSet,
    pub top_k: Option<usize>,
    /// Restrict the search to these files (attached to the chat).
    pub file_ids: Vec<String>,
}

impl SearchParams {
    pub fn new(
        embedding: Vec<f32>,
        user_id: impl Into<String>,
        filters: FilterSet,
        top_k: Option<usize>,
    ) -> Result<Self, RetrievalError> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(RetrievalError::new(
                None,
                "user id is required to scope retrieval",
            ));
        }
        Ok(Self {
            embedding,
            user_id,
            filters,
            top_k,
            file_ids: Vec::new(),
        })
    }

    pub fn with_file_ids(mut self, file_ids: Vec<String>) -> Self {
        self.file_ids = file_ids;
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

/// Wire body of `POST /file_ops/search_docs`.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SearchDocsRequest {
    pub embedding: Vec<f32>,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_filter: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_ids: Option<Vec<String>>,
}

impl From<&SearchParams> for SearchDocsRequest {
    fn from(params: &SearchParams) -> Self {
        let f = &params.filters;
        Self {
            embedding: params.embedding.clone(),
            user_id: params.user_id.clone(),
            file_name_filter: f.file_name.clone(),
            collection_filter: if f.collections.is_empty() {
                None
            } else {
                Some(f.collections.clone())
            },
            description_filter: f.description.clone(),
            start_date: f
                .date_range
                .start
                .map(|d| d.format("%Y-%m-%d").to_string()),
            end_date: f.date_range.end.map(|d| d.format("%Y-%m-%d").to_string()),
            top_k: params.top_k,
            file_ids: if params.file_ids.is_empty() {
                None
            } else {
                Some(params.file_ids.clone())
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchDocsResponse {
    #[serde(default)]
    retrieved_chunks: Vec<RetrievedChunk>,
}

/// Sends a search to the retrieval backend.
#[async_trait]
pub trait RetrievalGateway: Send + Sync {
    async fn search(&self, params: &SearchParams) -> Result<Vec<RetrievedChunk>, RetrievalError>;
}

/// HTTP implementation of [`RetrievalGateway`].
pub struct HttpRetrievalGateway {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRetrievalGateway {
    pub fn new(config: &BackendConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}{}",
                config.url.trim_end_matches('/'),
                config.search_path
            ),
        })
    }
}

#[async_trait]
impl RetrievalGateway for HttpRetrievalGateway {
    async fn search(&self, params: &SearchParams) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let body = SearchDocsRequest::from(params);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(endpoint = %self.endpoint, error = %e, "search request failed");
                RetrievalError::new(None, format!("search request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(endpoint = %self.endpoint, %status, "search backend returned an error");
            return Err(RetrievalError::new(Some(status.as_u16()), text));
        }

        let parsed: SearchDocsResponse = response.json().await.map_err(|e| {
            RetrievalError::new(
                Some(status.as_u16()),
                format!("invalid search response: {}", e),
            )
        })?;

        debug!(
            user_id = params.user_id(),
            count = parsed.retrieved_chunks.len(),
            "search returned chunks"
        );
        Ok(parsed.retrieved_chunks)
    }
}

/// Keep the `top_k` highest-scoring chunks, score-descending.
///
/// The sort is stable, so chunks with equal scores keep backend order.
pub fn cap_chunks(mut chunks: Vec<RetrievedChunk>, top_k: usize) -> Vec<RetrievedChunk> {
    chunks.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    chunks.truncate(top_k);
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::DateRange;
    use crate::models::ChunkMetadata;
    use chrono::NaiveDate;

    fn chunk(score: f64) -> RetrievedChunk {
        RetrievedChunk {
            content: format!("chunk {}", score),
            score,
            metadata: ChunkMetadata::default(),
        }
    }

    #[test]
    fn test_cap_sorts_desc_then_truncates() {
        let capped = cap_chunks(vec![chunk(0.9), chunk(0.7), chunk(0.95)], 2);
        let scores: Vec<f64> = capped.iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![0.95, 0.9]);
    }

    #[test]
    fn test_cap_larger_than_len() {
        let capped = cap_chunks(vec![chunk(0.1), chunk(0.2)], 20);
        assert_eq!(capped.len(), 2);
        assert_eq!(capped[0].score, 0.2);
    }

    #[test]
    fn test_params_require_user_id() {
        let err = SearchParams::new(vec![0.1], "  ", FilterSet::default(), None).unwrap_err();
        assert!(err.message.contains("user id"));
    }

    #[test]
    fn test_request_body_skips_absent_filters() {
        let params = SearchParams::new(vec![0.5], "u1", FilterSet::default(), Some(20)).unwrap();
        let json = serde_json::to_value(SearchDocsRequest::from(&params)).unwrap();
        assert_eq!(json["user_id"], "u1");
        assert_eq!(json["top_k"], 20);
        assert!(json.get("file_name_filter").is_none());
        assert!(json.get("collection_filter").is_none());
        assert!(json.get("start_date").is_none());
        assert!(json.get("file_ids").is_none());
    }

    #[test]
    fn test_request_body_carries_attached_files() {
        let params = SearchParams::new(vec![0.5], "u1", FilterSet::default(), None)
            .unwrap()
            .with_file_ids(vec!["f1".into()]);
        let json = serde_json::to_value(SearchDocsRequest::from(&params)).unwrap();
        assert_eq!(json["file_ids"][0], "f1");
    }

    #[test]
    fn test_request_body_carries_filters() {
        let filters = FilterSet {
            file_name: Some("msa".into()),
            collections: vec!["legal".into()],
            description: None,
            date_range: DateRange::between(
                NaiveDate::from_ymd_opt(2023, 12, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
            ),
        };
        let params = SearchParams::new(vec![0.5], "u1", filters, None).unwrap();
        let json = serde_json::to_value(SearchDocsRequest::from(&params)).unwrap();
        assert_eq!(json["file_name_filter"], "msa");
        assert_eq!(json["collection_filter"][0], "legal");
        assert_eq!(json["start_date"], "2023-12-01");
        assert_eq!(json["end_date"], "2024-06-30");
    }
}
