//! TOML configuration parsing and validation.
//!
//! All settings live in one file (default `./config/chat.toml`). Every
//! section except `[db]` may be omitted and falls back to defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::ChatSettings;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub chat: ChatDefaults,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub url: String,
    #[serde(default = "default_search_path")]
    pub search_path: String,
    #[serde(default = "default_ingest_path")]
    pub ingest_path: String,
    #[serde(default = "default_score_test_path")]
    pub score_test_path: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            search_path: default_search_path(),
            ingest_path: default_ingest_path(),
            score_test_path: default_score_test_path(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_backend_url() -> String {
    "http://127.0.0.1:8000/api".to_string()
}
fn default_search_path() -> String {
    "/file_ops/search_docs".to_string()
}
fn default_ingest_path() -> String {
    "/background_ingest_all".to_string()
}
fn default_score_test_path() -> String {
    "/run_score_test".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_openai_url")]
    pub url: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: default_openai_url(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_openai_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_openai_url")]
    pub base_url: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_url(),
            model: default_chat_model(),
            max_tokens: None,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    /// `deterministic` or `remote`.
    #[serde(default = "default_strategy")]
    pub strategy: String,
    /// Model used by the remote strategy; falls back to `[llm].model`.
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL of an external `/api/chat/intent` service.
    #[serde(default)]
    pub intent_url: Option<String>,
    /// `heuristic` or `remote`.
    #[serde(default = "default_follow_up")]
    pub follow_up: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            model: None,
            intent_url: None,
            follow_up: default_follow_up(),
        }
    }
}

fn default_strategy() -> String {
    "deterministic".to_string()
}
fn default_follow_up() -> String {
    "heuristic".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_file_match_threshold")]
    pub file_match_threshold: f64,
    #[serde(default = "default_date_window_months")]
    pub date_window_months: u32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            enabled: true,
            file_match_threshold: default_file_match_threshold(),
            date_window_months: default_date_window_months(),
        }
    }
}

fn default_top_k() -> usize {
    20
}
fn default_true() -> bool {
    true
}
fn default_file_match_threshold() -> f64 {
    0.6
}
fn default_date_window_months() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatDefaults {
    #[serde(default = "default_prompt")]
    pub prompt: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_context_length")]
    pub context_length: usize,
    #[serde(default)]
    pub include_profile_context: bool,
    #[serde(default)]
    pub profile_context: String,
    #[serde(default)]
    pub include_workspace_instructions: bool,
    #[serde(default)]
    pub workspace_instructions: String,
    #[serde(default)]
    pub assistant_name: Option<String>,
    #[serde(default = "default_workspace_id")]
    pub workspace_id: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

impl Default for ChatDefaults {
    fn default() -> Self {
        Self {
            prompt: default_prompt(),
            temperature: default_temperature(),
            context_length: default_context_length(),
            include_profile_context: false,
            profile_context: String::new(),
            include_workspace_instructions: false,
            workspace_instructions: String::new(),
            assistant_name: None,
            workspace_id: default_workspace_id(),
            user_id: default_user_id(),
        }
    }
}

fn default_prompt() -> String {
    "You are a helpful assistant.".to_string()
}
fn default_temperature() -> f32 {
    0.5
}
fn default_context_length() -> usize {
    4096
}
fn default_workspace_id() -> String {
    "default".to_string()
}
fn default_user_id() -> String {
    "local".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl Config {
    /// Config used when no file is available (e.g. `chat classify`).
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/chat.sqlite"),
            },
            backend: BackendConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            classifier: ClassifierConfig::default(),
            retrieval: RetrievalConfig::default(),
            chat: ChatDefaults::default(),
            server: ServerConfig::default(),
        }
    }

    /// Chat settings a freshly started chat uses.
    pub fn chat_settings(&self) -> ChatSettings {
        ChatSettings {
            workspace_id: self.chat.workspace_id.clone(),
            user_id: self.chat.user_id.clone(),
            model: self.llm.model.clone(),
            prompt: self.chat.prompt.clone(),
            temperature: self.chat.temperature,
            context_length: self.chat.context_length,
            include_profile_context: self.chat.include_profile_context,
            profile_context: self.chat.profile_context.clone(),
            include_workspace_instructions: self.chat.include_workspace_instructions,
            workspace_instructions: self.chat.workspace_instructions.clone(),
            assistant_id: None,
            assistant_name: self.chat.assistant_name.clone(),
            use_retrieval: self.retrieval.enabled,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

/// Ten years either side of a fuzzy date.
const MAX_DATE_WINDOW_MONTHS: u32 = 120;

fn validate(config: &Config) -> Result<()> {
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if !(config.retrieval.file_match_threshold > 0.0 && config.retrieval.file_match_threshold <= 1.0)
    {
        anyhow::bail!("retrieval.file_match_threshold must be in (0.0, 1.0]");
    }

    if config.retrieval.date_window_months > MAX_DATE_WINDOW_MONTHS {
        anyhow::bail!(
            "retrieval.date_window_months must be <= {}",
            MAX_DATE_WINDOW_MONTHS
        );
    }

    if config.chat.context_length == 0 {
        anyhow::bail!("chat.context_length must be > 0");
    }

    if config.chat.user_id.trim().is_empty() {
        anyhow::bail!("chat.user_id must not be empty");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    match config.classifier.strategy.as_str() {
        "deterministic" | "remote" => {}
        other => anyhow::bail!(
            "Unknown classifier strategy: '{}'. Must be deterministic or remote.",
            other
        ),
    }

    match config.classifier.follow_up.as_str() {
        "heuristic" | "remote" => {}
        other => anyhow::bail!(
            "Unknown follow-up detection: '{}'. Must be heuristic or remote.",
            other
        ),
    }

    Ok(())
}
