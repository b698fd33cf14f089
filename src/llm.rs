//! Language-model client.
//!
//! [`LanguageModel`] is the seam between the orchestrator and whatever
//! produces assistant text. [`OpenAiChatModel`] talks to any
//! OpenAI-compatible `/chat/completions` endpoint with `stream: true`,
//! forwarding each delta to a callback as it arrives.
//!
//! # Cancellation
//!
//! Every read from the response stream races against the run's
//! [`AbortSignal`]. When the signal fires first the request is dropped and
//! the text received so far is returned with `stopped = true`.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::LlmConfig;
use crate::error::GenerationError;
use crate::models::Role;
use crate::state::AbortSignal;

/// One message of a completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

/// Result of a completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    /// `true` when the abort signal cut the stream short.
    pub stopped: bool,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(
        &self,
        request: &CompletionRequest,
        signal: &AbortSignal,
        on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<Completion, GenerationError>;
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

/// Streaming client for an OpenAI-compatible chat completions API.
pub struct OpenAiChatModel {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiChatModel {
    /// Reads the key from `OPENAI_API_KEY`; local servers may run without one.
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &LlmConfig, api_key: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn complete(
        &self,
        request: &CompletionRequest,
        signal: &AbortSignal,
        on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<Completion, GenerationError> {
        let body = WireRequest {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: true,
        };

        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let resp = tokio::select! {
            resp = req.send() => resp.map_err(|e| GenerationError::Transport(e.to_string()))?,
            _ = signal.aborted() => {
                info!("generation aborted before the first byte");
                return Ok(Completion { content: String::new(), stopped: true });
            }
        };

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Api { status, message });
        }

        let mut content = String::new();
        let mut parser = SseParser::default();
        let mut stream = resp.bytes_stream();

        loop {
            let next = tokio::select! {
                next = stream.next() => next,
                _ = signal.aborted() => {
                    info!(chars = content.len(), "generation aborted mid-stream");
                    return Ok(Completion { content, stopped: true });
                }
            };

            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| GenerationError::Transport(e.to_string()))?;

            for event in parser.push(&chunk)? {
                match event {
                    SseEvent::Delta(delta) => {
                        on_delta(&delta);
                        content.push_str(&delta);
                    }
                    SseEvent::Done => {
                        debug!(chars = content.len(), "completion finished");
                        return Ok(Completion {
                            content,
                            stopped: false,
                        });
                    }
                }
            }
        }

        Ok(Completion {
            content,
            stopped: false,
        })
    }
}

#[derive(Debug, PartialEq)]
enum SseEvent {
    Delta(String),
    Done,
}

/// Incremental parser for `data:` lines of a completion stream.
#[derive(Default)]
struct SseParser {
    buffer: String,
}

impl SseParser {
    fn push(&mut self, bytes: &[u8]) -> Result<Vec<SseEvent>, GenerationError> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim().to_string();
            self.buffer.drain(..=pos);

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim_start();
            if data == "[DONE]" {
                events.push(SseEvent::Done);
                return Ok(events);
            }

            let parsed: StreamResponse = serde_json::from_str(data)
                .map_err(|e| GenerationError::Stream(format!("{}: {}", e, data)))?;
            if let Some(choice) = parsed.choices.first() {
                if let Some(delta) = &choice.delta.content {
                    if !delta.is_empty() {
                        events.push(SseEvent::Delta(delta.clone()));
                    }
                }
                if choice.finish_reason.is_some() {
                    events.push(SseEvent::Done);
                    return Ok(events);
                }
            }
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_splits_lines_across_chunks() {
        let mut parser = SseParser::default();
        let first = parser
            .push(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\ndata: {\"choi")
            .unwrap();
        assert_eq!(first, vec![SseEvent::Delta("Hel".into())]);

        let second = parser
            .push(b"ces\":[{\"delta\":{\"content\":\"lo\"}}]}\n\ndata: [DONE]\n")
            .unwrap();
        assert_eq!(second, vec![SseEvent::Delta("lo".into()), SseEvent::Done]);
    }

    #[test]
    fn test_parser_ignores_comments_and_role_deltas() {
        let mut parser = SseParser::default();
        let events = parser
            .push(b": keep-alive\ndata: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n")
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_parser_finish_reason_ends_stream() {
        let mut parser = SseParser::default();
        let events = parser
            .push(b"data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n")
            .unwrap();
        assert_eq!(events, vec![SseEvent::Done]);
    }

    #[test]
    fn test_parser_rejects_garbage() {
        let mut parser = SseParser::default();
        let err = parser.push(b"data: {not json\n").unwrap_err();
        assert!(matches!(err, GenerationError::Stream(_)));
    }

    #[test]
    fn test_wire_request_shape() {
        let messages = vec![ChatMessage::system("be brief"), ChatMessage::user("hi")];
        let body = WireRequest {
            model: "gpt-4o-mini",
            messages: &messages,
            temperature: 0.0,
            max_tokens: Some(10),
            stream: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["max_tokens"], 10);
        assert_eq!(json["stream"], true);
    }
}
