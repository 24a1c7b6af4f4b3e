use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Conversation, Message, User};

// -- JWT Claims --

/// Identity assertion carried by every bearer token. Shared by the token
/// service (issue/validate) and the auth middleware, which places it in the
/// request extensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub username: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub iss: String,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
}

// -- Users --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub user_id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            user_id: user.id,
            email: user.email,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            created_at: user.created_at.timestamp(),
            updated_at: user.updated_at.timestamp(),
        }
    }
}

/// Partial profile update; absent fields are left untouched.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

// -- Conversations --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateConversationRequest {
    pub title: String,
    #[serde(default)]
    pub model_used: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationResponse {
    pub conversation_id: Uuid,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_pinned: bool,
}

impl From<Conversation> for ConversationResponse {
    fn from(conversation: Conversation) -> Self {
        Self {
            conversation_id: conversation.id,
            title: conversation.title,
            model_used: conversation.model_used,
            created_at: conversation.created_at,
            is_pinned: conversation.is_pinned,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationListItem {
    pub conversation_id: Uuid,
    pub title: String,
    pub is_pinned: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<Conversation> for ConversationListItem {
    fn from(conversation: Conversation) -> Self {
        Self {
            conversation_id: conversation.id,
            title: conversation.title,
            is_pinned: conversation.is_pinned,
            updated_at: conversation.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<ConversationListItem>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PinConversationRequest {
    pub is_pinned: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PinConversationResponse {
    pub conversation_id: Uuid,
    pub is_pinned: bool,
    pub message: String,
}

// -- Messages --

/// `sender` stays a string here so an unknown role is reported by the
/// aggregate as an invalid role rather than as a body parse failure.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddMessageRequest {
    pub sender: String,
    pub message: String,
    #[serde(default)]
    pub parent_message_id: Option<Uuid>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddMessageResponse {
    pub message_id: Uuid,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageHistoryItem {
    pub message_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<Uuid>,
    pub message: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl From<Message> for MessageHistoryItem {
    fn from(message: Message) -> Self {
        Self {
            message_id: message.id,
            parent_message_id: message.parent_message_id,
            message: message.content,
            role: message.sender.to_string(),
            metadata: message.metadata,
            timestamp: message.timestamp,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub messages: Vec<MessageHistoryItem>,
}

// -- Misc --

/// Plain acknowledgement body used by delete endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusMessage {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}
