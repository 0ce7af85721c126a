//! Row types and schema for the chat store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub user_id: String,
    pub title: Option<String>,
    pub persona: Option<Persona>,
    pub created_at: DateTime<Utc>,
}

/// Persona blob stored on a chat. Field names match the client wire shape,
/// including its mixed casing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    /// Credential/endpoint string: an `sk-` key, an HTTP(S) URL, or absent.
    #[serde(default, rename = "apiKey", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(default, rename = "additionalInfo", skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

/// One persisted chat message. Immutable once stored; edits become rulebook
/// rows, never updates to this table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: String,
    pub chat_id: String,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl MessageRow {
    /// Row with a locally generated temporary id, used for optimistic
    /// rendering before the store has assigned the real row.
    pub fn local(chat_id: &str, role: &str, content: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            role: role.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    Like,
    Dislike,
    Edit,
}

impl FeedbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackKind::Like => "like",
            FeedbackKind::Dislike => "dislike",
            FeedbackKind::Edit => "edit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "like" => Some(FeedbackKind::Like),
            "dislike" => Some(FeedbackKind::Dislike),
            "edit" => Some(FeedbackKind::Edit),
            _ => None,
        }
    }
}

/// One rulebook row: a like/dislike/edit event recorded against an assistant
/// message. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub id: String,
    pub user_id: String,
    pub chat_id: Option<String>,
    pub message_id: Option<String>,
    pub kind: FeedbackKind,
    pub original_content: String,
    pub new_content: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub key_value: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

pub const SCHEMA_SQL: &str = "
-- Chats table
CREATE TABLE IF NOT EXISTS chats (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    title TEXT,
    persona TEXT,
    created_at TIMESTAMP NOT NULL
);
-- Messages table
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    chat_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL,
    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE
);
-- Rulebook table (feedback entries)
CREATE TABLE IF NOT EXISTS rulebook (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    chat_id TEXT,
    message_id TEXT,
    feedback_type TEXT NOT NULL,
    original_content TEXT NOT NULL,
    new_content TEXT,
    created_at TIMESTAMP NOT NULL
);
-- API keys table
CREATE TABLE IF NOT EXISTS api_keys (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    key_value TEXT NOT NULL,
    enabled BOOLEAN NOT NULL DEFAULT TRUE,
    created_at TIMESTAMP NOT NULL
);
-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_chats_user ON chats (user_id);
CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages (chat_id);
CREATE INDEX IF NOT EXISTS idx_messages_created ON messages (created_at);
CREATE INDEX IF NOT EXISTS idx_rulebook_user ON rulebook (user_id);
CREATE INDEX IF NOT EXISTS idx_rulebook_chat ON rulebook (chat_id);
CREATE INDEX IF NOT EXISTS idx_api_keys_user ON api_keys (user_id);
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feedback_kind_round_trips_through_str() {
        for kind in [FeedbackKind::Like, FeedbackKind::Dislike, FeedbackKind::Edit] {
            assert_eq!(FeedbackKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(FeedbackKind::parse("meh"), None);
    }

    #[test]
    fn persona_uses_client_wire_field_names() {
        let persona = Persona {
            api_key: Some("sk-abc".into()),
            role: Some("helper".into()),
            tone: Some("friendly".into()),
            additional_info: Some("context".into()),
            name: None,
            system_prompt: Some("Be nice.".into()),
        };
        let json = serde_json::to_value(&persona).unwrap();
        assert_eq!(json["apiKey"], "sk-abc");
        assert_eq!(json["additionalInfo"], "context");
        assert_eq!(json["system_prompt"], "Be nice.");
        assert!(json.get("name").is_none());
    }

    #[test]
    fn local_message_rows_get_unique_ids() {
        let a = MessageRow::local("chat-1", "user", "hi");
        let b = MessageRow::local("chat-1", "user", "hi");
        assert_ne!(a.id, b.id);
        assert_eq!(a.role, "user");
    }
}
