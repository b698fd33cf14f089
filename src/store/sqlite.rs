//! SQLite-backed [`ChatStore`].
//!
//! Timestamps are stored as Unix milliseconds; list-valued message fields
//! (`file_item_ids`, `image_paths`) as JSON text.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::models::{Chat, ChatSettings, FileRecord, Message, NewMessage, Role};

use super::{check_sequence, ChatStore};

pub struct SqliteChatStore {
    pool: SqlitePool,
}

impl SqliteChatStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn chat_from_row(row: &SqliteRow) -> Chat {
    let temperature: f64 = row.get("temperature");
    let context_length: i64 = row.get("context_length");
    Chat {
        id: row.get("id"),
        workspace_id: row.get("workspace_id"),
        user_id: row.get("user_id"),
        assistant_id: row.get("assistant_id"),
        model: row.get("model"),
        prompt: row.get("prompt"),
        temperature: temperature as f32,
        context_length: context_length.max(0) as usize,
        created_at: from_millis(row.get("created_at")),
        updated_at: from_millis(row.get("updated_at")),
    }
}

fn message_from_row(row: &SqliteRow) -> Result<Message> {
    let role: String = row.get("role");
    let file_item_ids: String = row.get("file_item_ids");
    let image_paths: String = row.get("image_paths");
    Ok(Message {
        id: row.get("id"),
        chat_id: row.get("chat_id"),
        role: Role::parse(&role).ok_or_else(|| anyhow!("unknown role in database: {}", role))?,
        content: row.get("content"),
        sequence_number: row.get("sequence_number"),
        model: row.get("model"),
        assistant_id: row.get("assistant_id"),
        file_item_ids: serde_json::from_str(&file_item_ids).unwrap_or_default(),
        image_paths: serde_json::from_str(&image_paths).unwrap_or_default(),
        created_at: from_millis(row.get("created_at")),
        updated_at: from_millis(row.get("updated_at")),
    })
}

const CHAT_COLUMNS: &str = "id, workspace_id, user_id, assistant_id, model, prompt, temperature, context_length, created_at, updated_at";

#[async_trait]
impl ChatStore for SqliteChatStore {
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
            created_at: from_millis(now.timestamp_millis()),
            updated_at: from_millis(now.timestamp_millis()),
        };

        sqlx::query(
            r#"
            INSERT INTO chats (id, workspace_id, user_id, assistant_id, model, prompt,
                               temperature, context_length, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&chat.id)
        .bind(&chat.workspace_id)
        .bind(&chat.user_id)
        .bind(&chat.assistant_id)
        .bind(&chat.model)
        .bind(&chat.prompt)
        .bind(chat.temperature as f64)
        .bind(chat.context_length as i64)
        .bind(now.timestamp_millis())
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to create chat")?;

        Ok(chat)
    }

    async fn get_chat(&self, id: &str) -> Result<Option<Chat>> {
        let row = sqlx::query(&format!("SELECT {} FROM chats WHERE id = ?", CHAT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(chat_from_row))
    }

    async fn touch_chat(&self, id: &str) -> Result<Chat> {
        let now = Utc::now().timestamp_millis();
        let result = sqlx::query("UPDATE chats SET updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(anyhow!("chat not found: {}", id));
        }
        self.get_chat(id)
            .await?
            .ok_or_else(|| anyhow!("chat not found: {}", id))
    }

    async fn append_messages(&self, chat_id: &str, turns: &[NewMessage]) -> Result<Vec<Message>> {
        let mut tx = self.pool.begin().await?;

        let current_max: Option<i64> =
            sqlx::query_scalar("SELECT MAX(sequence_number) FROM messages WHERE chat_id = ?")
                .bind(chat_id)
                .fetch_one(&mut *tx)
                .await?;
        check_sequence(chat_id, current_max, turns)?;

        let now = Utc::now();
        let ts = now.timestamp_millis();
        let mut appended = Vec::with_capacity(turns.len());
        for turn in turns {
            sqlx::query(
                r#"
                INSERT INTO messages (id, chat_id, role, content, sequence_number, model,
                                      assistant_id, file_item_ids, image_paths,
                                      created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&turn.id)
            .bind(chat_id)
            .bind(turn.role.as_str())
            .bind(&turn.content)
            .bind(turn.sequence_number)
            .bind(&turn.model)
            .bind(&turn.assistant_id)
            .bind(serde_json::to_string(&turn.file_item_ids)?)
            .bind(serde_json::to_string(&turn.image_paths)?)
            .bind(ts)
            .bind(ts)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert message {}", turn.sequence_number))?;

            appended.push(turn.clone().into_message(chat_id, from_millis(ts)));
        }

        tx.commit().await?;
        Ok(appended)
    }

    async fn delete_from(&self, chat_id: &str, sequence_number: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM messages WHERE chat_id = ? AND sequence_number >= ?")
            .bind(chat_id)
            .bind(sequence_number)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_messages(&self, chat_id: &str) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            r#"
            SELECT id, chat_id, role, content, sequence_number, model, assistant_id,
                   file_item_ids, image_paths, created_at, updated_at
            FROM messages
            WHERE chat_id = ?
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(message_from_row).collect()
    }

    async fn link_retrieved_chunks(&self, search_id: &str, chunk_ids: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().timestamp_millis();
        for chunk_id in chunk_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO retrieved_chunks (search_id, chunk_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(search_id)
            .bind(chunk_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn retrieved_chunk_ids(&self, search_id: &str) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar(
            "SELECT chunk_id FROM retrieved_chunks WHERE search_id = ? ORDER BY rowid ASC",
        )
        .bind(search_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn upsert_file(&self, file: &FileRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO files (id, user_id, name, description, collection)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                user_id = excluded.user_id,
                name = excluded.name,
                description = excluded.description,
                collection = excluded.collection
            "#,
        )
        .bind(&file.id)
        .bind(&file.user_id)
        .bind(&file.name)
        .bind(&file.description)
        .bind(&file.collection)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_files(&self, user_id: &str) -> Result<Vec<FileRecord>> {
        let rows = sqlx::query(
            "SELECT id, user_id, name, description, collection FROM files WHERE user_id = ? ORDER BY name ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| FileRecord {
                id: row.get("id"),
                user_id: row.get("user_id"),
                name: row.get("name"),
                description: row.get("description"),
                collection: row.get("collection"),
            })
            .collect())
    }
}
