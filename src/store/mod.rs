//! Persistence adapter for chats, messages, search linkage and files.
//!
//! The [`ChatStore`] trait is the narrow CRUD contract the orchestrator
//! depends on. Two implementations ship:
//!
//! | Type | Backing | Used by |
//! |------|---------|---------|
//! | [`MemoryChatStore`] | `RwLock`'d maps | tests, `chat classify` |
//! | [`SqliteChatStore`] | SQLite via `sqlx` | CLI and server |
//!
//! # Sequence numbers
//!
//! [`append_messages`](ChatStore::append_messages) rejects any turn whose
//! sequence number is not strictly greater than every sequence number
//! already stored for the chat (and than the previous turn in the batch).
//! [`delete_from`](ChatStore::delete_from) removes a message and
//! everything after it, which is how edits make room for new turns.

pub mod memory;
pub mod sqlite;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{Chat, ChatSettings, FileRecord, Message, NewMessage};

pub use memory::MemoryChatStore;
pub use sqlite::SqliteChatStore;

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Create a chat from the given settings.
    async fn create_chat(&self, settings: &ChatSettings) -> Result<Chat>;

    async fn get_chat(&self, id: &str) -> Result<Option<Chat>>;

    /// Bump `updated_at`. Errors if the chat does not exist.
    async fn touch_chat(&self, id: &str) -> Result<Chat>;

    /// Append turns in order and return them as stored.
    async fn append_messages(&self, chat_id: &str, turns: &[NewMessage]) -> Result<Vec<Message>>;

    /// Delete the message with `sequence_number` and every later one.
    /// Returns the number of rows removed.
    async fn delete_from(&self, chat_id: &str, sequence_number: i64) -> Result<u64>;

    /// All messages of a chat in sequence order.
    async fn list_messages(&self, chat_id: &str) -> Result<Vec<Message>>;

    /// Record which chunks a search returned.
    async fn link_retrieved_chunks(&self, search_id: &str, chunk_ids: &[String]) -> Result<()>;

    async fn retrieved_chunk_ids(&self, search_id: &str) -> Result<Vec<String>>;

    async fn upsert_file(&self, file: &FileRecord) -> Result<()>;

    /// Files owned by `user_id`, ordered by name.
    async fn list_files(&self, user_id: &str) -> Result<Vec<FileRecord>>;
}

/// Check that `turns` continue strictly after `current_max`.
pub(crate) fn check_sequence(chat_id: &str, current_max: Option<i64>, turns: &[NewMessage]) -> Result<()> {
    let mut last = current_max;
    for turn in turns {
        if let Some(prev) = last {
            if turn.sequence_number <= prev {
                bail!(
                    "sequence number {} for chat {} must be greater than {}",
                    turn.sequence_number,
                    chat_id,
                    prev
                );
            }
        }
        last = Some(turn.sequence_number);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[test]
    fn test_check_sequence() {
        let turns = [
            NewMessage::new(Role::User, "q", 3),
            NewMessage::new(Role::Assistant, "a", 4),
        ];
        assert!(check_sequence("c", None, &turns).is_ok());
        assert!(check_sequence("c", Some(2), &turns).is_ok());
        assert!(check_sequence("c", Some(3), &turns).is_err());

        let backwards = [
            NewMessage::new(Role::User, "q", 5),
            NewMessage::new(Role::Assistant, "a", 5),
        ];
        assert!(check_sequence("c", None, &backwards).is_err());
    }
}
