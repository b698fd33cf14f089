//! In-memory [`ChatStore`] for tests and file-less commands.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::models::{Chat, ChatSettings, FileRecord, Message, NewMessage};

use super::{check_sequence, ChatStore};

#[derive(Default)]
pub struct MemoryChatStore {
    chats: RwLock<HashMap<String, Chat>>,
    messages: RwLock<HashMap<String, Vec<Message>>>,
    links: RwLock<HashMap<String, Vec<String>>>,
    files: RwLock<HashMap<String, FileRecord>>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("store lock poisoned"))
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn create_chat(&self, settings: &ChatSettings) -> Result<Chat> {
        let now = Utc::now();
        let chat = Chat {
            id: uuid::Uuid::new_v4().to_string(),
            workspace_id: settings.workspace_id.clone(),
            user_id: settings.user_id.clone(),
            assistant_id: settings.assistant_id.clone(),
            model: settings.model.clone(),
            prompt: settings.prompt.clone(),
            temperature: settings.temperature,
            context_length: settings.context_length,
            created_at: now,
            updated_at: now,
        };
        write(&self.chats)?.insert(chat.id.clone(), chat.clone());
        Ok(chat)
    }

    async fn get_chat(&self, id: &str) -> Result<Option<Chat>> {
        Ok(read(&self.chats)?.get(id).cloned())
    }

    async fn touch_chat(&self, id: &str) -> Result<Chat> {
        let mut chats = write(&self.chats)?;
        let chat = chats
            .get_mut(id)
            .ok_or_else(|| anyhow!("chat not found: {}", id))?;
        chat.updated_at = Utc::now();
        Ok(chat.clone())
    }

    async fn append_messages(&self, chat_id: &str, turns: &[NewMessage]) -> Result<Vec<Message>> {
        if !read(&self.chats)?.contains_key(chat_id) {
            return Err(anyhow!("chat not found: {}", chat_id));
        }
        let mut messages = write(&self.messages)?;
        let stored = messages.entry(chat_id.to_string()).or_default();
        let current_max = stored.iter().map(|m| m.sequence_number).max();
        check_sequence(chat_id, current_max, turns)?;

        let now = Utc::now();
        let appended: Vec<Message> = turns
            .iter()
            .cloned()
            .map(|t| t.into_message(chat_id, now))
            .collect();
        stored.extend(appended.iter().cloned());
        Ok(appended)
    }

    async fn delete_from(&self, chat_id: &str, sequence_number: i64) -> Result<u64> {
        let mut messages = write(&self.messages)?;
        let Some(stored) = messages.get_mut(chat_id) else {
            return Ok(0);
        };
        let before = stored.len();
        stored.retain(|m| m.sequence_number < sequence_number);
        Ok((before - stored.len()) as u64)
    }

    async fn list_messages(&self, chat_id: &str) -> Result<Vec<Message>> {
        let mut out = read(&self.messages)?
            .get(chat_id)
            .cloned()
            .unwrap_or_default();
        out.sort_by_key(|m| m.sequence_number);
        Ok(out)
    }

    async fn link_retrieved_chunks(&self, search_id: &str, chunk_ids: &[String]) -> Result<()> {
        let mut links = write(&self.links)?;
        let entry = links.entry(search_id.to_string()).or_default();
        for id in chunk_ids {
            if !entry.contains(id) {
                entry.push(id.clone());
            }
        }
        Ok(())
    }

    async fn retrieved_chunk_ids(&self, search_id: &str) -> Result<Vec<String>> {
        Ok(read(&self.links)?.get(search_id).cloned().unwrap_or_default())
    }

    async fn upsert_file(&self, file: &FileRecord) -> Result<()> {
        write(&self.files)?.insert(file.id.clone(), file.clone());
        Ok(())
    }

    async fn list_files(&self, user_id: &str) -> Result<Vec<FileRecord>> {
        let mut out: Vec<FileRecord> = read(&self.files)?
            .values()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }
}
