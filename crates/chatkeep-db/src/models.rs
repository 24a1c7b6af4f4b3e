//! Database row types. Kept separate from the `chatkeep-types` models so the
//! password hash and raw metadata encoding stay inside the store layer.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use chatkeep_types::models::{Conversation, Message, SenderRole, User};

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConversationRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub model_used: Option<String>,
    pub is_pinned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            title: row.title,
            model_used: row.model_used,
            is_pinned: row.is_pinned,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<Conversation> for ConversationRow {
    fn from(c: Conversation) -> Self {
        Self {
            id: c.id,
            owner_id: c.owner_id,
            title: c.title,
            model_used: c.model_used,
            is_pinned: c.is_pinned,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

/// `metadata` holds the JSON text exactly as stored.
#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub parent_message_id: Option<Uuid>,
    pub sender: SenderRole,
    pub content: String,
    pub metadata: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        let metadata = row.metadata.and_then(|raw| {
            serde_json::from_str(&raw)
                .inspect_err(|e| warn!("Corrupt metadata on message '{}': {}", row.id, e))
                .ok()
        });

        Self {
            id: row.id,
            conversation_id: row.conversation_id,
            parent_message_id: row.parent_message_id,
            sender: row.sender,
            content: row.content,
            metadata,
            timestamp: row.timestamp,
        }
    }
}

impl From<&Message> for MessageRow {
    fn from(m: &Message) -> Self {
        Self {
            id: m.id,
            conversation_id: m.conversation_id,
            parent_message_id: m.parent_message_id,
            sender: m.sender,
            content: m.content.clone(),
            metadata: m.metadata.as_ref().map(|v| v.to_string()),
            timestamp: m.timestamp,
        }
    }
}
