//! Message orchestrator.
//!
//! A [`ChatSession`] drives one chat through the turn state machine:
//!
//! ```text
//! Idle → Classifying → Dispatching → (Retrieving)? → Generating → Persisting → Idle
//!                                                   ↘ Cancelled → Idle
//! ```
//!
//! | Intent | Path | Language model | History |
//! |--------|------|----------------|---------|
//! | reserved command | backend job, notification | no | untouched |
//! | `semantic_search` | embed → search → summary | no | persisted |
//! | `follow_up` (with prior chunks) | restricted prompt | yes | persisted |
//! | `follow_up` (no prior chunks) | same as `general_chat` | yes | persisted |
//! | `file_retrieval` | fuzzy file match | no | untouched |
//! | `general_chat` | system + trimmed history (+ file context) | yes | persisted |
//!
//! Only [`ChatError::EmptyInput`] and [`ChatError::Busy`] are returned as
//! errors from [`ChatSession::submit`]. Every failure past that point ends
//! the turn with a [`TurnOutcome`] and a [`Notification`], and a failed turn
//! hands the original input back so it is not lost.
//!
//! The session state sits behind a `std::sync::Mutex` that is never held
//! across an `.await`. One run at a time is enforced by
//! [`ConversationState::begin_run`].

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::{Serialize, Serializer};
use tracing::{debug, error, info, warn};

use crate::backend::{BackendCommands, HttpBackendCommands};
use crate::config::Config;
use crate::db;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::error::{ChatError, RetrievalError};
use crate::files::{match_files, render_matches};
use crate::filters::{parse_filters, FilterSet};
use crate::intent::{ClassifyContext, Classifier, Intent, ReservedCommand};
use crate::llm::{CompletionRequest, LanguageModel, OpenAiChatModel};
use crate::models::{Chat, ChatSettings, FileMatch, Message, NewMessage, Role, RetrievedChunk};
use crate::notify::{Notification, Notifier};
use crate::prompt;
use crate::retrieval::{cap_chunks, HttpRetrievalGateway, RetrievalGateway, SearchParams};
use crate::state::{AbortSignal, ConversationSnapshot, ConversationState, Dispatch, Phase};
use crate::store::ChatStore;

/// Collaborators a session calls out to.
#[derive(Clone)]
pub struct Services {
    pub classifier: Arc<Classifier>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub retrieval: Arc<dyn RetrievalGateway>,
    pub backend: Arc<dyn BackendCommands>,
    pub model: Arc<dyn LanguageModel>,
    pub store: Arc<dyn ChatStore>,
    pub notifier: Arc<dyn Notifier>,
}

/// Tunables taken from `[retrieval]` and `[llm]`.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub top_k: usize,
    pub file_match_threshold: f64,
    pub date_window_months: u32,
    pub max_tokens: Option<u32>,
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            file_match_threshold: config.retrieval.file_match_threshold,
            date_window_months: config.retrieval.date_window_months,
            max_tokens: config.llm.max_tokens,
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&Config::minimal())
    }
}

/// How a turn ended.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnOutcome {
    IngestionTriggered {
        detail: String,
    },
    ScoreTestCompleted {
        detail: String,
    },
    CommandFailed {
        error: String,
    },
    SearchAnswered {
        message: Message,
        chunk_count: usize,
        persisted: bool,
    },
    Generated {
        message: Message,
        persisted: bool,
    },
    /// The user stopped generation; the partial text is kept as the answer.
    Stopped {
        message: Message,
        persisted: bool,
    },
    FileMatches {
        matches: Vec<FileMatch>,
        text: String,
    },
    Failed {
        #[serde(serialize_with = "error_string")]
        error: ChatError,
        restored_input: String,
    },
}

fn error_string<S: Serializer>(error: &ChatError, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&error.to_string())
}

impl TurnOutcome {
    /// Text to show the user for this outcome.
    pub fn display_text(&self) -> String {
        match self {
            TurnOutcome::IngestionTriggered { .. } => "Ingestion started.".to_string(),
            TurnOutcome::ScoreTestCompleted { detail } => {
                if detail.trim().is_empty() {
                    "Score test completed.".to_string()
                } else {
                    format!("Score test completed: {}", detail.trim())
                }
            }
            TurnOutcome::CommandFailed { error } => error.clone(),
            TurnOutcome::SearchAnswered { message, .. }
            | TurnOutcome::Generated { message, .. }
            | TurnOutcome::Stopped { message, .. } => message.content.clone(),
            TurnOutcome::FileMatches { text, .. } => text.clone(),
            TurnOutcome::Failed { error, .. } => error.to_string(),
        }
    }

    pub fn message(&self) -> Option<&Message> {
        match self {
            TurnOutcome::SearchAnswered { message, .. }
            | TurnOutcome::Generated { message, .. }
            | TurnOutcome::Stopped { message, .. } => Some(message),
            _ => None,
        }
    }
}

struct Inner {
    state: ConversationState,
    chat: Option<Chat>,
    /// Bumped by `new_chat`; results of a run from an older epoch are dropped.
    epoch: u64,
}

/// Releases the run slot when a run ends, including when its future is dropped.
struct RunGuard<'a> {
    inner: &'a Mutex<Inner>,
    epoch: u64,
}

/// A claimed run slot and the abort signal that belongs to it.
struct ClaimedRun<'a> {
    signal: AbortSignal,
    guard: RunGuard<'a>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.epoch == self.epoch {
            inner.state.finish_run();
        }
    }
}

/// One open chat and the machinery to run turns against it.
pub struct ChatSession {
    services: Services,
    options: SessionOptions,
    settings: ChatSettings,
    inner: Mutex<Inner>,
}

impl ChatSession {
    /// A session for a chat that does not exist yet; it is created on the
    /// first successful send.
    pub fn new(services: Services, options: SessionOptions, settings: ChatSettings) -> Self {
        Self {
            services,
            options,
            settings,
            inner: Mutex::new(Inner {
                state: ConversationState::new(),
                chat: None,
                epoch: 0,
            }),
        }
    }

    /// Open an existing chat and load its history.
    pub async fn resume(
        services: Services,
        options: SessionOptions,
        settings: ChatSettings,
        chat_id: &str,
    ) -> anyhow::Result<Self> {
        let chat = services
            .store
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("chat not found: {}", chat_id))?;
        let messages = services.store.list_messages(chat_id).await?;

        let session = Self::new(services, options, settings);
        {
            let mut inner = session.lock();
            inner.state.load_messages(messages);
            inner.chat = Some(chat);
        }
        Ok(session)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_phase(&self, phase: Phase) {
        self.lock().state.set_phase(phase);
        info!(phase = ?phase, "turn phase");
    }

    pub fn chat_id(&self) -> Option<String> {
        self.lock().chat.as_ref().map(|c| c.id.clone())
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        self.lock().state.snapshot()
    }

    /// Abort the in-flight generation. Returns `false` if nothing was running.
    pub fn stop(&self) -> bool {
        let stopped = self.lock().state.stop();
        if stopped {
            info!("stop requested");
        }
        stopped
    }

    /// Forget the last search summary and chunks.
    pub fn clear_context(&self) {
        self.lock().state.clear();
        self.services
            .notifier
            .notify(Notification::info("Search context cleared."));
    }

    /// Start over with a fresh, not yet created chat.
    pub fn new_chat(&self) {
        let mut inner = self.lock();
        inner.state.reset();
        inner.chat = None;
        inner.epoch += 1;
        info!("started new chat");
    }

    pub fn attach_files(&self, file_ids: Vec<String>) {
        self.lock().state.set_attached_files(file_ids);
    }

    pub fn set_filters(&self, filters: FilterSet) {
        self.lock().state.set_filters(filters);
    }

    /// Run one turn.
    pub async fn submit(&self, input: &str) -> Result<TurnOutcome, ChatError> {
        self.submit_streaming(input, &mut |_: &str| {}).await
    }

    /// Run one turn, passing generated text to `on_delta` as it streams.
    pub async fn submit_streaming(
        &self,
        input: &str,
        on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<TurnOutcome, ChatError> {
        let text = input.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyInput);
        }
        let run = self.claim()?;
        Ok(self.run_claimed(text, run, on_delta).await)
    }

    /// Delete message `sequence_number` and everything after it, then send
    /// `content` in its place.
    ///
    /// The run slot is held from before the delete until the new turn ends,
    /// so a concurrent send gets [`ChatError::Busy`] and never interleaves.
    pub async fn edit_and_resend(
        &self,
        sequence_number: i64,
        content: &str,
    ) -> Result<TurnOutcome, ChatError> {
        let text = content.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyInput);
        }
        let run = self.claim()?;
        let epoch = run.guard.epoch;

        if let Some(chat_id) = self.chat_id() {
            let removed = self
                .services
                .store
                .delete_from(&chat_id, sequence_number)
                .await
                .map_err(|e| ChatError::Persistence(format!("{:#}", e)))?;
            debug!(chat_id = %chat_id, sequence_number, removed, "deleted messages for edit");
        }
        {
            let mut inner = self.lock();
            if inner.epoch == epoch {
                inner.state.truncate_from(sequence_number);
            }
        }

        Ok(self.run_claimed(text, run, &mut |_: &str| {}).await)
    }

    fn claim(&self) -> Result<ClaimedRun<'_>, ChatError> {
        let mut inner = self.lock();
        let signal = inner.state.begin_run()?;
        Ok(ClaimedRun {
            signal,
            guard: RunGuard {
                inner: &self.inner,
                epoch: inner.epoch,
            },
        })
    }

    async fn run_claimed(
        &self,
        text: &str,
        run: ClaimedRun<'_>,
        on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> TurnOutcome {
        let epoch = run.guard.epoch;
        let ctx = {
            let inner = self.lock();
            ClassifyContext {
                last_summary: inner.state.last_search_summary().map(String::from),
                has_prior_chunks: !inner.state.last_search_chunks().is_empty(),
            }
        };
        info!(phase = ?Phase::Classifying, "turn phase");

        let outcome = self.run(text, &run.signal, ctx, epoch, on_delta).await;

        if let TurnOutcome::Failed {
            error,
            restored_input,
        } = &outcome
        {
            warn!(error = %error, "turn failed, input restored");
            let mut inner = self.lock();
            if inner.epoch == epoch {
                inner.state.restore_input(restored_input.clone());
            }
        }
        outcome
    }

    async fn run(
        &self,
        input: &str,
        signal: &AbortSignal,
        ctx: ClassifyContext,
        epoch: u64,
        on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> TurnOutcome {
        if let Some(command) = ReservedCommand::detect(input) {
            return self.run_command(command).await;
        }

        let intent = self.services.classifier.classify(input, &ctx).await;
        info!(%intent, "classified message");

        match intent {
            Intent::SemanticSearch => self.run_search(input, epoch).await,
            Intent::FollowUp if ctx.has_prior_chunks => {
                self.run_follow_up(input, signal, epoch, on_delta).await
            }
            Intent::FollowUp => {
                info!("follow-up without prior results, answering as general chat");
                self.supersede_search(epoch);
                self.run_general(input, signal, epoch, on_delta).await
            }
            Intent::FileRetrieval => {
                self.supersede_search(epoch);
                self.run_file_match(input).await
            }
            Intent::RunIngestion => {
                // Only the exact command text triggers backend jobs.
                debug!("non-literal ingestion request, answering as general chat");
                self.supersede_search(epoch);
                self.run_general(input, signal, epoch, on_delta).await
            }
            Intent::GeneralChat => {
                self.supersede_search(epoch);
                self.run_general(input, signal, epoch, on_delta).await
            }
        }
    }

    /// A turn that is neither a search nor a follow-up ends the previous
    /// search's relevance. Reserved commands leave it alone.
    fn supersede_search(&self, epoch: u64) {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            return;
        }
        if inner.state.last_search_summary().is_some() || !inner.state.last_search_chunks().is_empty() {
            inner.state.clear();
            debug!("previous search context superseded");
        }
    }

    // ---- reserved commands ----

    async fn run_command(&self, command: ReservedCommand) -> TurnOutcome {
        let notifier = &self.services.notifier;
        match command {
            ReservedCommand::RunIngestion => {
                self.set_phase(Phase::Dispatching(Dispatch::Ingestion));
                match self.services.backend.trigger_ingestion().await {
                    Ok(detail) => {
                        notifier.notify(Notification::success("Ingestion started."));
                        TurnOutcome::IngestionTriggered { detail }
                    }
                    Err(e) => {
                        let error = format!("Ingestion failed: {:#}", e);
                        error!(error = %error, "ingestion trigger failed");
                        notifier.notify(Notification::error(error.clone()));
                        TurnOutcome::CommandFailed { error }
                    }
                }
            }
            ReservedCommand::RunScoreTest => {
                self.set_phase(Phase::Dispatching(Dispatch::ScoreTest));
                match self.services.backend.run_score_test().await {
                    Ok(detail) => {
                        notifier.notify(Notification::success("Score test completed."));
                        TurnOutcome::ScoreTestCompleted { detail }
                    }
                    Err(e) => {
                        let error = format!("Score test failed: {:#}", e);
                        error!(error = %error, "score test failed");
                        notifier.notify(Notification::error(error.clone()));
                        TurnOutcome::CommandFailed { error }
                    }
                }
            }
        }
    }

    // ---- semantic search ----

    async fn retrieve(
        &self,
        query: &str,
        filters: FilterSet,
        file_ids: Vec<String>,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        self.set_phase(Phase::Retrieving);
        let embedding = self.services.embedder.embed(query).await?;
        let params = SearchParams::new(
            embedding,
            self.settings.user_id.clone(),
            filters,
            Some(self.options.top_k),
        )?
        .with_file_ids(file_ids);
        let chunks = self.services.retrieval.search(&params).await?;
        Ok(cap_chunks(chunks, self.options.top_k))
    }

    async fn run_search(&self, input: &str, epoch: u64) -> TurnOutcome {
        self.set_phase(Phase::Dispatching(Dispatch::Search));

        let parsed = parse_filters(input, self.options.date_window_months);
        let filters = self.lock().state.filters().merged_with(&parsed.filters);
        let query = if parsed.query.is_empty() {
            input.to_string()
        } else {
            parsed.query
        };

        let chunks = match self.retrieve(&query, filters, Vec::new()).await {
            Ok(chunks) => chunks,
            Err(e) => {
                let error = ChatError::Retrieval(e);
                self.services
                    .notifier
                    .notify(Notification::error(error.to_string()));
                return TurnOutcome::Failed {
                    error,
                    restored_input: input.to_string(),
                };
            }
        };

        let summary = prompt::synthesize_search_summary(&query, &chunks);
        let search_id = uuid::Uuid::new_v4().to_string();
        let chunk_count = chunks.len();
        info!(search_id = %search_id, chunk_count, "search answered");

        let chunk_ids: Vec<String> = chunks.iter().map(RetrievedChunk::chunk_id).collect();
        {
            let mut inner = self.lock();
            if inner.epoch == epoch {
                if chunks.is_empty() {
                    inner.state.clear();
                } else {
                    inner.state.record_search(search_id.clone(), summary.clone(), chunks);
                }
            }
        }

        if !chunk_ids.is_empty() {
            if let Err(e) = self
                .services
                .store
                .link_retrieved_chunks(&search_id, &chunk_ids)
                .await
            {
                warn!(search_id = %search_id, error = %format!("{:#}", e), "failed to link retrieved chunks");
            }
        }

        let (message, persisted) = self.persist(input, &summary, None, epoch).await;
        TurnOutcome::SearchAnswered {
            message,
            chunk_count,
            persisted,
        }
    }

    // ---- generation paths ----

    async fn run_follow_up(
        &self,
        input: &str,
        signal: &AbortSignal,
        epoch: u64,
        on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> TurnOutcome {
        let (summary, chunks) = {
            let inner = self.lock();
            (
                inner.state.last_search_summary().unwrap_or_default().to_string(),
                inner.state.last_search_chunks().to_vec(),
            )
        };
        debug!(chunks = chunks.len(), "answering follow-up from previous results");

        let request = CompletionRequest {
            model: self.settings.model.clone(),
            messages: prompt::build_follow_up_messages(&summary, &chunks, input),
            temperature: self.settings.temperature,
            max_tokens: self.options.max_tokens,
        };
        self.generate(input, request, signal, epoch, on_delta).await
    }

    async fn run_general(
        &self,
        input: &str,
        signal: &AbortSignal,
        epoch: u64,
        on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> TurnOutcome {
        let (mut history, attached, filters, next_seq) = {
            let inner = self.lock();
            (
                inner.state.messages().to_vec(),
                inner.state.attached_files().to_vec(),
                inner.state.filters().clone(),
                inner.state.next_sequence(),
            )
        };

        let mut context = None;
        if self.settings.use_retrieval && !attached.is_empty() {
            match self.retrieve(input, filters, attached.clone()).await {
                Ok(chunks) if !chunks.is_empty() => {
                    context = Some(prompt::build_retrieval_text(&chunks));
                }
                Ok(_) => debug!("no file context found for attached files"),
                Err(e) => {
                    warn!(error = %e, "file context retrieval failed, continuing without it");
                    self.services.notifier.notify(Notification::error(format!(
                        "Could not load context from attached files: {}",
                        e
                    )));
                }
            }
        }

        let chat_id = self.chat_id().unwrap_or_default();
        history.push(
            NewMessage::new(Role::User, input, next_seq)
                .with_file_items(attached)
                .into_message(&chat_id, Utc::now()),
        );

        let messages = prompt::build_final_messages(
            &self.settings,
            &history,
            context.as_deref(),
            Utc::now().date_naive(),
        );
        let (system, turns) = prompt::role_counts(&messages);
        debug!(system, turns, "built prompt");

        let request = CompletionRequest {
            model: self.settings.model.clone(),
            messages,
            temperature: self.settings.temperature,
            max_tokens: self.options.max_tokens,
        };
        self.generate(input, request, signal, epoch, on_delta).await
    }

    async fn generate(
        &self,
        input: &str,
        request: CompletionRequest,
        signal: &AbortSignal,
        epoch: u64,
        on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> TurnOutcome {
        self.set_phase(Phase::Generating);

        match self.services.model.complete(&request, signal, on_delta).await {
            Ok(completion) if completion.stopped => {
                self.set_phase(Phase::Cancelled);
                if completion.content.trim().is_empty() {
                    return TurnOutcome::Failed {
                        error: ChatError::Cancelled,
                        restored_input: input.to_string(),
                    };
                }
                let (message, persisted) = self
                    .persist(input, &completion.content, Some(request.model), epoch)
                    .await;
                TurnOutcome::Stopped { message, persisted }
            }
            Ok(completion) => {
                let (message, persisted) = self
                    .persist(input, &completion.content, Some(request.model), epoch)
                    .await;
                TurnOutcome::Generated { message, persisted }
            }
            Err(e) => {
                let error = ChatError::Generation(e);
                error!(error = %error, "generation failed");
                self.services
                    .notifier
                    .notify(Notification::error(error.to_string()));
                TurnOutcome::Failed {
                    error,
                    restored_input: input.to_string(),
                }
            }
        }
    }

    // ---- file retrieval ----

    async fn run_file_match(&self, input: &str) -> TurnOutcome {
        self.set_phase(Phase::Dispatching(Dispatch::FileMatch));
        let files = match self.services.store.list_files(&self.settings.user_id).await {
            Ok(files) => files,
            Err(e) => {
                let error = ChatError::Persistence(format!("{:#}", e));
                self.services
                    .notifier
                    .notify(Notification::error(error.to_string()));
                return TurnOutcome::Failed {
                    error,
                    restored_input: input.to_string(),
                };
            }
        };

        let matches = match_files(input, &files, self.options.file_match_threshold);
        info!(candidates = files.len(), matches = matches.len(), "file match");
        let text = render_matches(&matches);
        TurnOutcome::FileMatches { matches, text }
    }

    // ---- persistence ----

    /// Store the user turn and the assistant answer. On failure the answer
    /// is still returned and kept in local history, with `persisted = false`.
    async fn persist(
        &self,
        user_text: &str,
        assistant_text: &str,
        model: Option<String>,
        epoch: u64,
    ) -> (Message, bool) {
        self.set_phase(Phase::Persisting);

        let (seq, existing, attached) = {
            let inner = self.lock();
            (
                inner.state.next_sequence(),
                inner.chat.clone(),
                inner.state.attached_files().to_vec(),
            )
        };

        let user = NewMessage::new(Role::User, user_text, seq).with_file_items(attached);
        let mut assistant = NewMessage::new(Role::Assistant, assistant_text, seq + 1);
        assistant.model = model;
        assistant.assistant_id = self.settings.assistant_id.clone();
        let turns = [user, assistant];

        let (chat, saved) = match self.ensure_chat(existing).await {
            Ok(chat) => {
                let stored = self.services.store.append_messages(&chat.id, &turns).await;
                (Some(chat), stored)
            }
            Err(e) => (None, Err(e)),
        };

        let (messages, persisted) = match saved {
            Ok(stored) => (stored, true),
            Err(e) => {
                error!(error = %format!("{:#}", e), "PersistenceFailure: chat not saved");
                self.services.notifier.notify(Notification::error(
                    ChatError::Persistence(format!("{:#}", e)).to_string(),
                ));
                let chat_id = chat
                    .as_ref()
                    .map(|c| c.id.clone())
                    .or_else(|| self.chat_id())
                    .unwrap_or_default();
                let now = Utc::now();
                let local = turns
                    .iter()
                    .cloned()
                    .map(|t| t.into_message(&chat_id, now))
                    .collect();
                (local, false)
            }
        };

        let answer = messages
            .last()
            .cloned()
            .unwrap_or_else(|| turns[1].clone().into_message("", Utc::now()));

        let mut inner = self.lock();
        if inner.epoch == epoch {
            if let Some(chat) = chat {
                inner.chat = Some(chat);
            }
            inner.state.push_messages(messages);
        }
        (answer, persisted)
    }

    async fn ensure_chat(&self, existing: Option<Chat>) -> anyhow::Result<Chat> {
        let store = &self.services.store;
        match existing {
            Some(chat) => store.touch_chat(&chat.id).await,
            None => {
                let chat = store.create_chat(&self.settings).await?;
                info!(chat_id = %chat.id, "created chat");
                Ok(chat)
            }
        }
    }
}

impl Services {
    /// Wire up the HTTP-backed collaborators and the SQLite store from config.
    pub async fn from_config(config: &Config, notifier: Arc<dyn Notifier>) -> anyhow::Result<Self> {
        let model: Arc<dyn LanguageModel> = Arc::new(OpenAiChatModel::new(&config.llm)?);
        let classifier = Classifier::from_config(config, model.clone())?;
        Ok(Self {
            classifier: Arc::new(classifier),
            embedder: Arc::from(create_provider(&config.embedding)?),
            retrieval: Arc::new(HttpRetrievalGateway::new(&config.backend)?),
            backend: Arc::new(HttpBackendCommands::new(&config.backend)?),
            model,
            store: Arc::new(db::open_store(config).await?),
            notifier,
        })
    }
}
