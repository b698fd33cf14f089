//! Per-chat conversation state.
//!
//! One [`ConversationState`] exists per open chat. Only the orchestrator
//! mutates it; everything else reads a [`ConversationSnapshot`].

use serde::Serialize;
use tokio::sync::watch;

use crate::error::ChatError;
use crate::filters::FilterSet;
use crate::models::{Message, RetrievedChunk};

// ============ Abort signalling ============

/// Fires the abort of an in-flight run.
#[derive(Debug)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }
}

/// Observes an [`AbortHandle`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the paired handle aborts. Pends forever if the handle
    /// is dropped without aborting.
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    (AbortHandle { tx }, AbortSignal { rx })
}

// ============ Phases ============

/// What a dispatching run is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dispatch {
    Ingestion,
    ScoreTest,
    Search,
    FileMatch,
}

/// Position of the orchestrator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "phase", content = "dispatch")]
pub enum Phase {
    Idle,
    Classifying,
    Dispatching(Dispatch),
    Retrieving,
    Generating,
    Persisting,
    Cancelled,
}

// ============ State ============

#[derive(Debug)]
pub struct ConversationState {
    messages: Vec<Message>,
    pending_input: String,
    is_generating: bool,
    abort: Option<AbortHandle>,
    last_search_summary: Option<String>,
    last_search_chunks: Vec<RetrievedChunk>,
    last_search_id: Option<String>,
    filters: FilterSet,
    attached_files: Vec<String>,
    phase: Phase,
}

/// Read-only view of a [`ConversationState`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationSnapshot {
    pub messages: Vec<Message>,
    pub pending_input: String,
    pub is_generating: bool,
    pub last_search_summary: Option<String>,
    pub last_search_chunks: Vec<RetrievedChunk>,
    pub last_search_id: Option<String>,
    pub filters: FilterSet,
    pub attached_files: Vec<String>,
    pub phase: Phase,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationState {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            pending_input: String::new(),
            is_generating: false,
            abort: None,
            last_search_summary: None,
            last_search_chunks: Vec::new(),
            last_search_id: None,
            filters: FilterSet::default(),
            attached_files: Vec::new(),
            phase: Phase::Idle,
        }
    }

    /// Start over for a new chat. Aborts anything still in flight.
    pub fn reset(&mut self) {
        if let Some(handle) = self.abort.take() {
            handle.abort();
        }
        *self = Self::new();
    }

    /// Remember the result of a semantic search for follow-up questions.
    pub fn record_search(
        &mut self,
        search_id: impl Into<String>,
        summary: impl Into<String>,
        chunks: Vec<RetrievedChunk>,
    ) {
        self.last_search_id = Some(search_id.into());
        self.last_search_summary = Some(summary.into());
        self.last_search_chunks = chunks;
    }

    /// Drop the remembered search context. Idempotent.
    pub fn clear(&mut self) {
        self.last_search_id = None;
        self.last_search_summary = None;
        self.last_search_chunks.clear();
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            messages: self.messages.clone(),
            pending_input: self.pending_input.clone(),
            is_generating: self.is_generating,
            last_search_summary: self.last_search_summary.clone(),
            last_search_chunks: self.last_search_chunks.clone(),
            last_search_id: self.last_search_id.clone(),
            filters: self.filters.clone(),
            attached_files: self.attached_files.clone(),
            phase: self.phase,
        }
    }

    // ---- orchestrator helpers ----

    /// Claim the single run slot for this chat.
    pub fn begin_run(&mut self) -> Result<AbortSignal, ChatError> {
        if self.is_generating {
            return Err(ChatError::Busy);
        }
        let (handle, signal) = abort_pair();
        self.is_generating = true;
        self.abort = Some(handle);
        self.pending_input.clear();
        self.phase = Phase::Classifying;
        Ok(signal)
    }

    pub fn finish_run(&mut self) {
        self.is_generating = false;
        self.abort = None;
        self.phase = Phase::Idle;
    }

    /// Fire the abort handle of the in-flight run, if any.
    pub fn stop(&mut self) -> bool {
        match &self.abort {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn restore_input(&mut self, input: impl Into<String>) {
        self.pending_input = input.into();
    }

    pub fn set_pending_input(&mut self, input: impl Into<String>) {
        self.pending_input = input.into();
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_generating(&self) -> bool {
        self.is_generating
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn push_messages(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    pub fn load_messages(&mut self, mut messages: Vec<Message>) {
        messages.sort_by_key(|m| m.sequence_number);
        self.messages = messages;
    }

    /// Drop every message with sequence number `>= sequence_number`.
    pub fn truncate_from(&mut self, sequence_number: i64) {
        self.messages
            .retain(|m| m.sequence_number < sequence_number);
    }

    /// Next free sequence number.
    pub fn next_sequence(&self) -> i64 {
        self.messages
            .iter()
            .map(|m| m.sequence_number + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn last_search_summary(&self) -> Option<&str> {
        self.last_search_summary.as_deref()
    }

    pub fn last_search_chunks(&self) -> &[RetrievedChunk] {
        &self.last_search_chunks
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    pub fn set_filters(&mut self, filters: FilterSet) {
        self.filters = filters;
    }

    pub fn attached_files(&self) -> &[String] {
        &self.attached_files
    }

    pub fn set_attached_files(&mut self, file_ids: Vec<String>) {
        self.attached_files = file_ids;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkMetadata, NewMessage, Role};

    fn chunk(content: &str) -> RetrievedChunk {
        RetrievedChunk {
            content: content.to_string(),
            score: 0.8,
            metadata: ChunkMetadata::default(),
        }
    }

    #[test]
    fn test_clear_twice_equals_clear_once() {
        let mut once = ConversationState::new();
        once.record_search("s1", "Found 3 contracts", vec![chunk("a"), chunk("b")]);
        once.clear();

        let mut twice = ConversationState::new();
        twice.record_search("s1", "Found 3 contracts", vec![chunk("a"), chunk("b")]);
        twice.clear();
        twice.clear();

        assert_eq!(once.snapshot(), twice.snapshot());
        assert!(twice.last_search_chunks().is_empty());
        assert!(twice.last_search_summary().is_none());
    }

    #[test]
    fn test_clear_keeps_history() {
        let mut state = ConversationState::new();
        state.push_messages([NewMessage::new(Role::User, "hi", 0).into_message("c", chrono::Utc::now())]);
        state.record_search("s1", "summary", vec![chunk("a")]);
        state.clear();
        assert_eq!(state.messages().len(), 1);
    }

    #[test]
    fn test_begin_run_rejects_second_run() {
        let mut state = ConversationState::new();
        let _signal = state.begin_run().unwrap();
        assert_eq!(state.begin_run().unwrap_err(), ChatError::Busy);
        state.finish_run();
        assert!(state.begin_run().is_ok());
    }

    #[test]
    fn test_stop_fires_signal() {
        let mut state = ConversationState::new();
        let signal = state.begin_run().unwrap();
        assert!(!signal.is_aborted());
        assert!(state.stop());
        assert!(signal.is_aborted());
    }

    #[test]
    fn test_stop_without_run_is_noop() {
        let mut state = ConversationState::new();
        assert!(!state.stop());
    }

    #[tokio::test]
    async fn test_aborted_future_resolves() {
        let (handle, signal) = abort_pair();
        let waiter = tokio::spawn(async move { signal.aborted().await });
        handle.abort();
        waiter.await.unwrap();
    }

    #[test]
    fn test_next_sequence_and_truncate() {
        let mut state = ConversationState::new();
        let now = chrono::Utc::now();
        state.push_messages((0..4).map(|i| NewMessage::new(Role::User, "m", i).into_message("c", now)));
        assert_eq!(state.next_sequence(), 4);
        state.truncate_from(2);
        assert_eq!(state.messages().len(), 2);
        assert_eq!(state.next_sequence(), 2);
    }

    #[test]
    fn test_reset_returns_to_fresh_state() {
        let mut state = ConversationState::new();
        state.record_search("s", "summary", vec![chunk("a")]);
        state.set_attached_files(vec!["f1".into()]);
        let _ = state.begin_run().unwrap();
        state.reset();
        assert_eq!(state.snapshot(), ConversationState::new().snapshot());
    }
}
