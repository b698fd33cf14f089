//! Error taxonomy at the orchestrator boundary.
//!
//! Plumbing below the orchestrator returns `anyhow::Result`; everything
//! that crosses into a turn outcome is folded into [`ChatError`].

use thiserror::Error;

/// Failure of the retrieval path (embedding or search backend).
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{}", describe_retrieval(.status, .message))]
pub struct RetrievalError {
    /// Upstream HTTP status, if the backend answered at all.
    pub status: Option<u16>,
    pub message: String,
}

fn describe_retrieval(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("HTTP {}: {}", code, message),
        None => message.to_string(),
    }
}

impl RetrievalError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for RetrievalError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(None, format!("{:#}", err))
    }
}

/// Failure of a language-model call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerationError {
    #[error("language model returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("language model request failed: {0}")]
    Transport(String),
    #[error("malformed completion stream: {0}")]
    Stream(String),
}

/// Errors surfaced by a chat turn.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ChatError {
    #[error("message must not be empty")]
    EmptyInput,

    #[error("a response is already being generated; stop it before sending again")]
    Busy,

    #[error("intent classification failed: {0}")]
    Classification(String),

    #[error("search failed: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("generation was cancelled")]
    Cancelled,

    #[error("failed to save chat: {0}")]
    Persistence(String),
}
