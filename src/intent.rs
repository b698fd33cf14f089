//! Intent classification.
//!
//! Every submitted message is mapped to exactly one [`Intent`]. Two
//! strategies share the contract and are selected by `[classifier] strategy`:
//!
//! | Strategy | Type | How |
//! |----------|------|-----|
//! | `deterministic` | [`KeywordClassifier`] | regex keyword rules |
//! | `remote` | [`RemoteClassifier`] | language-model label or `/api/chat/intent` |
//!
//! Reserved command strings (`run ingestion`, `run score test`) are checked
//! before either strategy runs and always win.
//!
//! A remote classifier never fails the turn: transport errors and labels
//! outside the closed set are logged and degrade to [`Intent::GeneralChat`].

use anyhow::{bail, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::llm::{ChatMessage, CompletionRequest, LanguageModel};
use crate::state::AbortSignal;

/// The closed set of message intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    GeneralChat,
    SemanticSearch,
    FollowUp,
    RunIngestion,
    FileRetrieval,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::GeneralChat => "general_chat",
            Intent::SemanticSearch => "semantic_search",
            Intent::FollowUp => "follow_up",
            Intent::RunIngestion => "run_ingestion",
            Intent::FileRetrieval => "file_retrieval",
        }
    }

    /// Decode a label produced by a model or an intent service.
    ///
    /// Accepts the canonical snake_case labels and the older spaced
    /// spellings, ignoring case, surrounding whitespace, quotes and a
    /// trailing period. Returns `None` for anything else.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label
            .trim()
            .trim_matches(|c| c == '"' || c == '\'' || c == '.' || c == '`')
            .trim()
            .to_lowercase();
        match normalized.as_str() {
            "general_chat" | "general chat" => Some(Intent::GeneralChat),
            "semantic_search" | "semantic search" => Some(Intent::SemanticSearch),
            "follow_up" | "follow-up" | "follow up" | "followup" => Some(Intent::FollowUp),
            "run_ingestion" | "run ingestion" => Some(Intent::RunIngestion),
            "file_retrieval" | "file retrieval" | "file selection" => Some(Intent::FileRetrieval),
            _ => None,
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact command strings that bypass classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservedCommand {
    RunIngestion,
    RunScoreTest,
}

impl ReservedCommand {
    /// Trimmed, case-insensitive exact match. Anything longer is not a command.
    pub fn detect(message: &str) -> Option<Self> {
        let m = message.trim();
        if m.eq_ignore_ascii_case("run ingestion") {
            Some(ReservedCommand::RunIngestion)
        } else if m.eq_ignore_ascii_case("run score test") {
            Some(ReservedCommand::RunScoreTest)
        } else {
            None
        }
    }

    /// Both commands are backend jobs and report as `run_ingestion`.
    pub fn intent(&self) -> Intent {
        Intent::RunIngestion
    }
}

/// What the classifier may consult besides the message itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifyContext {
    pub last_summary: Option<String>,
    pub has_prior_chunks: bool,
}

impl ClassifyContext {
    fn summary(&self) -> Option<&str> {
        self.last_summary
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

// ============ Keyword rules ============

struct Rules {
    file_request: Regex,
    file_name: Regex,
    search_verb: Regex,
    search_noun: Regex,
    reference: Regex,
    question_lead: Regex,
}

fn rules() -> &'static Rules {
    static RULES: OnceLock<Rules> = OnceLock::new();
    RULES.get_or_init(|| Rules {
        file_request: Regex::new(
            r"(?i)\b(open|pull up|show me (the )?file|get (the |me the )?file|fetch (the )?file|download)\b",
        )
        .expect("valid regex"),
        file_name: Regex::new(r"(?i)\b[\w-]+\.(pdf|docx?|txt|md|xlsx?|csv|pptx?|json|rtf)\b")
            .expect("valid regex"),
        search_verb: Regex::new(r"(?i)\b(search|find|look up|lookup|look for|locate|retrieve)\b")
            .expect("valid regex"),
        search_noun: Regex::new(
            r"(?i)\b(documents?|docs|contracts?|reports?|invoices?|records?|policies|agreements?)\b",
        )
        .expect("valid regex"),
        reference: Regex::new(
            r"(?i)\b(the (first|second|third|fourth|fifth|last|other|previous|same) one|first|second|third|fourth|fifth|those|these|that document|this document|that file|that one|above|it|its|they|them|their|the results?)\b",
        )
        .expect("valid regex"),
        question_lead: Regex::new(
            r"(?i)^(what|when|who|whom|where|which|why|how|does|do|did|is|are|was|were|can|could|should|would|summari[sz]e|tell|explain|compare|list|give)\b",
        )
        .expect("valid regex"),
    })
}

/// Deterministic keyword/regex strategy.
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn classify(&self, message: &str, ctx: &ClassifyContext) -> Intent {
        if let Some(cmd) = ReservedCommand::detect(message) {
            return cmd.intent();
        }
        if is_follow_up(message, ctx) {
            return Intent::FollowUp;
        }
        let r = rules();
        if r.file_request.is_match(message) || r.file_name.is_match(message) {
            return Intent::FileRetrieval;
        }
        if r.search_verb.is_match(message) || r.search_noun.is_match(message) {
            return Intent::SemanticSearch;
        }
        Intent::GeneralChat
    }
}

/// A question about earlier results: a prior summary exists, the message is
/// question-shaped, refers back to something, and asks for no new search.
pub fn is_follow_up(message: &str, ctx: &ClassifyContext) -> bool {
    if ctx.summary().is_none() {
        return false;
    }
    let r = rules();
    let m = message.trim();
    let question_shaped = m.ends_with('?') || r.question_lead.is_match(m);
    question_shaped && r.reference.is_match(m) && !r.search_verb.is_match(m)
}

// ============ Remote strategy ============

/// How follow-ups are detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUpMode {
    /// Keyword rule over the prior summary, evaluated locally.
    Heuristic,
    /// Ask the model, with the prior summary in the prompt.
    Remote,
}

enum RemoteBackend {
    Model {
        model: Arc<dyn LanguageModel>,
        model_name: String,
    },
    Endpoint {
        client: reqwest::Client,
        url: String,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IntentRequest<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_summary: Option<&'a str>,
}

#[derive(Deserialize)]
struct IntentResponse {
    intent: Option<String>,
}

/// Delegates classification to a language model or an intent service.
pub struct RemoteClassifier {
    backend: RemoteBackend,
    follow_up: FollowUpMode,
}

impl RemoteClassifier {
    pub fn with_model(
        model: Arc<dyn LanguageModel>,
        model_name: impl Into<String>,
        follow_up: FollowUpMode,
    ) -> Self {
        Self {
            backend: RemoteBackend::Model {
                model,
                model_name: model_name.into(),
            },
            follow_up,
        }
    }

    pub fn with_endpoint(
        base_url: &str,
        timeout: Duration,
        follow_up: FollowUpMode,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            backend: RemoteBackend::Endpoint {
                client,
                url: format!("{}/api/chat/intent", base_url.trim_end_matches('/')),
            },
            follow_up,
        })
    }

    pub async fn classify(&self, message: &str, ctx: &ClassifyContext) -> Intent {
        if let Some(cmd) = ReservedCommand::detect(message) {
            return cmd.intent();
        }
        if self.follow_up == FollowUpMode::Heuristic && is_follow_up(message, ctx) {
            return Intent::FollowUp;
        }

        let summary = match self.follow_up {
            FollowUpMode::Remote => ctx.summary(),
            FollowUpMode::Heuristic => None,
        };

        let label = match &self.backend {
            RemoteBackend::Model { model, model_name } => {
                ask_model(model.as_ref(), model_name, message, summary).await
            }
            RemoteBackend::Endpoint { client, url } => {
                ask_endpoint(client, url, message, summary).await
            }
        };

        match label {
            Ok(label) => match Intent::from_label(&label) {
                Some(intent) => {
                    debug!(%intent, "remote classification");
                    intent
                }
                None => {
                    warn!(label = %label, "ClassificationFailure: unrecognized label, using general_chat");
                    Intent::GeneralChat
                }
            },
            Err(e) => {
                warn!(error = %format!("{:#}", e), "ClassificationFailure: falling back to general_chat");
                Intent::GeneralChat
            }
        }
    }
}

/// System prompt for model-based classification.
pub fn classifier_prompt(previous_summary: Option<&str>) -> String {
    let mut prompt = String::from(
        "You are an intent classifier for a document chat assistant. \
         Classify the user's message as exactly one of: general_chat, semantic_search, file_retrieval",
    );
    match previous_summary {
        Some(summary) => {
            prompt.push_str(", follow_up.\n");
            prompt.push_str(
                "The previous search returned the results summarized below. \
                 Answer follow_up if the message asks about those results, \
                 otherwise treat it as a new topic and choose another label.\n\nPrevious search:\n",
            );
            prompt.push_str(summary);
            prompt.push('\n');
        }
        None => prompt.push_str(".\n"),
    }
    prompt.push_str("Respond with only the label.");
    prompt
}

async fn ask_model(
    model: &dyn LanguageModel,
    model_name: &str,
    message: &str,
    summary: Option<&str>,
) -> Result<String> {
    let request = CompletionRequest {
        model: model_name.to_string(),
        messages: vec![
            ChatMessage::system(classifier_prompt(summary)),
            ChatMessage::user(message),
        ],
        temperature: 0.0,
        max_tokens: Some(10),
    };
    let completion = model
        .complete(&request, &AbortSignal::never(), &mut |_: &str| {})
        .await?;
    Ok(completion.content)
}

async fn ask_endpoint(
    client: &reqwest::Client,
    url: &str,
    message: &str,
    summary: Option<&str>,
) -> Result<String> {
    let response = client
        .post(url)
        .json(&IntentRequest {
            message,
            previous_summary: summary,
        })
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        bail!("intent service returned {}", status);
    }
    let body: IntentResponse = response.json().await?;
    body.intent
        .ok_or_else(|| anyhow::anyhow!("intent service returned no label"))
}

// ============ Strategy selection ============

/// The configured classification strategy.
pub enum Classifier {
    Deterministic(KeywordClassifier),
    Remote(RemoteClassifier),
}

impl Classifier {
    pub fn from_config(config: &Config, model: Arc<dyn LanguageModel>) -> Result<Self> {
        let follow_up = match config.classifier.follow_up.as_str() {
            "remote" => FollowUpMode::Remote,
            _ => FollowUpMode::Heuristic,
        };
        match config.classifier.strategy.as_str() {
            "deterministic" => Ok(Classifier::Deterministic(KeywordClassifier)),
            "remote" => match &config.classifier.intent_url {
                Some(url) => Ok(Classifier::Remote(RemoteClassifier::with_endpoint(
                    url,
                    Duration::from_secs(config.backend.timeout_secs),
                    follow_up,
                )?)),
                None => {
                    let name = config
                        .classifier
                        .model
                        .clone()
                        .unwrap_or_else(|| config.llm.model.clone());
                    Ok(Classifier::Remote(RemoteClassifier::with_model(
                        model, name, follow_up,
                    )))
                }
            },
            other => bail!("Unknown classifier strategy: {}", other),
        }
    }

    pub async fn classify(&self, message: &str, ctx: &ClassifyContext) -> Intent {
        match self {
            Classifier::Deterministic(k) => k.classify(message, ctx),
            Classifier::Remote(r) => r.classify(message, ctx).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use crate::llm::Completion;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn with_summary() -> ClassifyContext {
        ClassifyContext {
            last_summary: Some("Found 3 contracts matching termination clause".into()),
            has_prior_chunks: true,
        }
    }

    #[test]
    fn test_reserved_commands_exact_only() {
        assert_eq!(
            ReservedCommand::detect("  Run Ingestion "),
            Some(ReservedCommand::RunIngestion)
        );
        assert_eq!(
            ReservedCommand::detect("RUN SCORE TEST"),
            Some(ReservedCommand::RunScoreTest)
        );
        assert_eq!(ReservedCommand::detect("please run ingestion"), None);
        assert_eq!(ReservedCommand::detect("run ingestion now"), None);
    }

    #[test]
    fn test_from_label_variants() {
        assert_eq!(Intent::from_label("semantic search"), Some(Intent::SemanticSearch));
        assert_eq!(Intent::from_label(" Follow-Up."), Some(Intent::FollowUp));
        assert_eq!(Intent::from_label("file selection"), Some(Intent::FileRetrieval));
        assert_eq!(Intent::from_label("\"general_chat\""), Some(Intent::GeneralChat));
        assert_eq!(Intent::from_label("weather"), None);
        assert_eq!(Intent::from_label(""), None);
    }

    #[test]
    fn test_keyword_search() {
        let k = KeywordClassifier;
        let ctx = ClassifyContext::default();
        assert_eq!(
            k.classify("search my contracts for termination clause", &ctx),
            Intent::SemanticSearch
        );
        assert_eq!(k.classify("find invoices from acme", &ctx), Intent::SemanticSearch);
    }

    #[test]
    fn test_keyword_file_request() {
        let k = KeywordClassifier;
        let ctx = ClassifyContext::default();
        assert_eq!(k.classify("open the quarterly report.pdf", &ctx), Intent::FileRetrieval);
        assert_eq!(k.classify("show me the file budget", &ctx), Intent::FileRetrieval);
    }

    #[test]
    fn test_keyword_general() {
        let k = KeywordClassifier;
        assert_eq!(
            k.classify("hello, how are you today", &ClassifyContext::default()),
            Intent::GeneralChat
        );
    }

    #[test]
    fn test_follow_up_needs_summary() {
        let k = KeywordClassifier;
        let msg = "what was the termination date in the second one?";
        assert_eq!(k.classify(msg, &with_summary()), Intent::FollowUp);
        assert_ne!(k.classify(msg, &ClassifyContext::default()), Intent::FollowUp);
    }

    #[test]
    fn test_new_search_beats_follow_up() {
        let k = KeywordClassifier;
        assert_eq!(
            k.classify("can you search for the second amendment?", &with_summary()),
            Intent::SemanticSearch
        );
    }

    #[test]
    fn test_reserved_wins_over_follow_up() {
        let k = KeywordClassifier;
        assert_eq!(k.classify("run ingestion", &with_summary()), Intent::RunIngestion);
    }

    #[test]
    fn test_prompt_embeds_summary() {
        let p = classifier_prompt(Some("Found 3 contracts"));
        assert!(p.contains("follow_up"));
        assert!(p.contains("Found 3 contracts"));
        assert!(!classifier_prompt(None).contains("follow_up"));
    }

    struct CannedModel {
        reply: Result<String, GenerationError>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl LanguageModel for CannedModel {
        async fn complete(
            &self,
            request: &CompletionRequest,
            _signal: &AbortSignal,
            _on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
        ) -> Result<Completion, GenerationError> {
            self.seen.lock().unwrap().push(request.clone());
            self.reply.clone().map(|content| Completion {
                content,
                stopped: false,
            })
        }
    }

    fn remote(reply: Result<String, GenerationError>, mode: FollowUpMode) -> (RemoteClassifier, Arc<CannedModel>) {
        let model = Arc::new(CannedModel {
            reply,
            seen: Mutex::new(Vec::new()),
        });
        (RemoteClassifier::with_model(model.clone(), "gpt-test", mode), model)
    }

    #[tokio::test]
    async fn test_remote_decodes_label() {
        let (c, model) = remote(Ok("semantic search".into()), FollowUpMode::Heuristic);
        let intent = c.classify("anything about leases", &ClassifyContext::default()).await;
        assert_eq!(intent, Intent::SemanticSearch);
        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[0].temperature, 0.0);
        assert_eq!(seen[0].max_tokens, Some(10));
    }

    #[tokio::test]
    async fn test_remote_unknown_label_falls_back() {
        let (c, _) = remote(Ok("weather report".into()), FollowUpMode::Heuristic);
        assert_eq!(c.classify("hi", &ClassifyContext::default()).await, Intent::GeneralChat);
    }

    #[tokio::test]
    async fn test_remote_failure_falls_back() {
        let (c, _) = remote(
            Err(GenerationError::Transport("connection refused".into())),
            FollowUpMode::Heuristic,
        );
        assert_eq!(c.classify("hi", &ClassifyContext::default()).await, Intent::GeneralChat);
    }

    #[tokio::test]
    async fn test_remote_reserved_skips_model() {
        let (c, model) = remote(Ok("general chat".into()), FollowUpMode::Remote);
        assert_eq!(c.classify("run score test", &with_summary()).await, Intent::RunIngestion);
        assert!(model.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remote_follow_up_mode_embeds_summary() {
        let (c, model) = remote(Ok("follow-up".into()), FollowUpMode::Remote);
        let intent = c.classify("tell me more", &with_summary()).await;
        assert_eq!(intent, Intent::FollowUp);
        let seen = model.seen.lock().unwrap();
        assert!(seen[0].messages[0].content.contains("Found 3 contracts"));
    }
}
