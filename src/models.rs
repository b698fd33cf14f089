//! Core data models used throughout Chat Harness.
//!
//! These types represent the chats, messages, retrieved chunks, and file
//! records that flow through the intent-routing and retrieval pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Author of a conversational turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

/// Settings a chat is created with and every prompt is built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSettings {
    pub workspace_id: String,
    pub user_id: String,
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    /// Token budget for system prompt + history.
    pub context_length: usize,
    pub include_profile_context: bool,
    pub profile_context: String,
    pub include_workspace_instructions: bool,
    pub workspace_instructions: String,
    pub assistant_id: Option<String>,
    pub assistant_name: Option<String>,
    /// Run retrieval over attached files during general chat.
    pub use_retrieval: bool,
}

/// A conversation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub workspace_id: String,
    pub user_id: String,
    pub assistant_id: Option<String>,
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub context_length: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One stored conversational turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub role: Role,
    pub content: String,
    /// Monotonic per chat; defines display and truncation order.
    pub sequence_number: i64,
    pub model: Option<String>,
    pub assistant_id: Option<String>,
    pub file_item_ids: Vec<String>,
    pub image_paths: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A turn to be appended to a chat by the persistence adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub sequence_number: i64,
    pub model: Option<String>,
    pub assistant_id: Option<String>,
    pub file_item_ids: Vec<String>,
    pub image_paths: Vec<String>,
}

impl NewMessage {
    pub fn new(role: Role, content: impl Into<String>, sequence_number: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            sequence_number,
            model: None,
            assistant_id: None,
            file_item_ids: Vec::new(),
            image_paths: Vec::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_file_items(mut self, ids: Vec<String>) -> Self {
        self.file_item_ids = ids;
        self
    }

    /// Materialize into a [`Message`] belonging to `chat_id`.
    pub fn into_message(self, chat_id: &str, now: DateTime<Utc>) -> Message {
        Message {
            id: self.id,
            chat_id: chat_id.to_string(),
            role: self.role,
            content: self.content,
            sequence_number: self.sequence_number,
            model: self.model,
            assistant_id: self.assistant_id,
            file_item_ids: self.file_item_ids,
            image_paths: self.image_paths,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Metadata attached to a retrieved chunk by the search backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub relevant_date: Option<String>,
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub section: Option<String>,
}

/// A scored snippet of document content returned by retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub content: String,
    pub score: f64,
    #[serde(default)]
    pub metadata: ChunkMetadata,
}

impl RetrievedChunk {
    /// Stable identifier for linkage rows: file id (or name) plus a content hash.
    pub fn chunk_id(&self) -> String {
        let owner = self
            .metadata
            .file_id
            .as_deref()
            .unwrap_or(self.metadata.file_name.as_str());
        let mut hasher = Sha256::new();
        hasher.update(owner.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.content.as_bytes());
        let digest = hex::encode(hasher.finalize());
        format!("{}:{}", owner, &digest[..16])
    }

    /// Display label such as `contract.pdf (legal, 2024-03-01)`.
    pub fn label(&self) -> String {
        let name = if self.metadata.file_name.is_empty() {
            "(unknown file)"
        } else {
            self.metadata.file_name.as_str()
        };
        let mut extras = Vec::new();
        if let Some(c) = &self.metadata.collection {
            extras.push(c.clone());
        }
        if let Some(d) = self
            .metadata
            .relevant_date
            .as_ref()
            .or(self.metadata.created_at.as_ref())
        {
            extras.push(d.chars().take(10).collect());
        }
        if extras.is_empty() {
            name.to_string()
        } else {
            format!("{} ({})", name, extras.join(", "))
        }
    }
}

/// A file known to the user's workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub collection: Option<String>,
}

/// A file whose name or description matched a file-retrieval request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileMatch {
    pub file: FileRecord,
    pub similarity: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(file_id: Option<&str>, content: &str) -> RetrievedChunk {
        RetrievedChunk {
            content: content.to_string(),
            score: 0.5,
            metadata: ChunkMetadata {
                file_name: "contract.pdf".to_string(),
                file_id: file_id.map(String::from),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_chunk_id_stable_and_content_sensitive() {
        let a = chunk(Some("f1"), "termination clause");
        let b = chunk(Some("f1"), "termination clause");
        let c = chunk(Some("f1"), "renewal clause");
        assert_eq!(a.chunk_id(), b.chunk_id());
        assert_ne!(a.chunk_id(), c.chunk_id());
        assert!(a.chunk_id().starts_with("f1:"));
    }

    #[test]
    fn test_chunk_id_falls_back_to_file_name() {
        let a = chunk(None, "x");
        assert!(a.chunk_id().starts_with("contract.pdf:"));
    }

    #[test]
    fn test_label_includes_collection_and_date() {
        let mut c = chunk(None, "x");
        c.metadata.collection = Some("legal".to_string());
        c.metadata.created_at = Some("2024-03-01T10:00:00Z".to_string());
        assert_eq!(c.label(), "contract.pdf (legal, 2024-03-01)");
    }

    #[test]
    fn test_role_roundtrip_names() {
        for role in [Role::User, Role::Assistant, Role::System] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("tool"), None);
    }

    #[test]
    fn test_chunk_deserializes_backend_shape() {
        let json = serde_json::json!({
            "content": "Either party may terminate...",
            "score": 0.91,
            "metadata": { "file_name": "msa.pdf", "collection": "contracts", "created_at": "2024-01-02" }
        });
        let c: RetrievedChunk = serde_json::from_value(json).unwrap();
        assert_eq!(c.metadata.file_name, "msa.pdf");
        assert_eq!(c.metadata.collection.as_deref(), Some("contracts"));
        assert!(c.metadata.file_id.is_none());
    }
}
