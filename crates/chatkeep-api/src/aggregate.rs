//! Conversation aggregate: a conversation and the messages that exist only
//! inside it. All consistency rules for the pair live here; handlers only
//! translate HTTP to these calls.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use chatkeep_db::models::{ConversationRow, MessageRow};
use chatkeep_db::queries::AppendOutcome;
use chatkeep_db::{Database, DbError};
use chatkeep_types::models::{Conversation, InvalidSenderRole, Message, SenderRole};

use crate::guard::{Access, authorize};

const MAX_TITLE_CHARS: usize = 255;
const MAX_MODEL_CHARS: usize = 100;

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("conversation not found")]
    NotFound,

    /// The owning account vanished between token issue and the write.
    #[error("owner account not found")]
    OwnerNotFound,

    #[error("access denied")]
    Forbidden,

    #[error(transparent)]
    InvalidRole(#[from] InvalidSenderRole),

    #[error("parent message does not belong to this conversation")]
    InvalidParent,

    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Store(#[from] DbError),
}

pub type ConversationResult<T> = Result<T, ConversationError>;

/// Pin state reported back after a pin change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinState {
    pub conversation_id: Uuid,
    pub is_pinned: bool,
}

#[derive(Clone)]
pub struct ConversationAggregate {
    db: Arc<Database>,
}

impl ConversationAggregate {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn create_conversation(
        &self,
        owner_id: Uuid,
        title: &str,
        model_used: Option<&str>,
    ) -> ConversationResult<Conversation> {
        if title.trim().is_empty() {
            return Err(ConversationError::Invalid("title is required".into()));
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(ConversationError::Invalid(format!(
                "title must be at most {MAX_TITLE_CHARS} characters"
            )));
        }
        let model_used = model_used.filter(|m| !m.trim().is_empty());
        if model_used.is_some_and(|m| m.chars().count() > MAX_MODEL_CHARS) {
            return Err(ConversationError::Invalid(format!(
                "model_used must be at most {MAX_MODEL_CHARS} characters"
            )));
        }

        let now = chatkeep_db::now();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            owner_id,
            title: title.to_string(),
            model_used: model_used.map(str::to_string),
            is_pinned: false,
            created_at: now,
            updated_at: now,
        };

        self.db
            .insert_conversation(&ConversationRow::from(conversation.clone()))
            .map_err(|e| match e {
                DbError::ForeignKeyViolation => ConversationError::OwnerNotFound,
                other => ConversationError::Store(other),
            })?;

        info!("Conversation {} created by {}", conversation.id, owner_id);
        Ok(conversation)
    }

    /// Append a message and bump the conversation's `updated_at` to the
    /// message timestamp. Both writes share one transaction.
    pub fn add_message(
        &self,
        conversation_id: Uuid,
        sender: &str,
        content: &str,
        parent_message_id: Option<Uuid>,
        metadata: Option<serde_json::Value>,
    ) -> ConversationResult<Message> {
        let sender: SenderRole = sender.parse()?;
        if content.is_empty() {
            return Err(ConversationError::Invalid("message is required".into()));
        }

        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            parent_message_id,
            sender,
            content: content.to_string(),
            metadata,
            timestamp: chatkeep_db::now(),
        };

        match self.db.append_message(&MessageRow::from(&message))? {
            AppendOutcome::Appended => {
                debug!("Message {} appended to {}", message.id, conversation_id);
                Ok(message)
            }
            AppendOutcome::ConversationMissing => Err(ConversationError::NotFound),
            AppendOutcome::ParentMissing => Err(ConversationError::InvalidParent),
        }
    }

    pub fn get(&self, conversation_id: Uuid) -> ConversationResult<Conversation> {
        self.db
            .get_conversation(conversation_id)?
            .map(Conversation::from)
            .ok_or(ConversationError::NotFound)
    }

    /// Messages oldest first.
    pub fn get_history(&self, conversation_id: Uuid) -> ConversationResult<Vec<Message>> {
        self.get(conversation_id)?;
        let rows = self.db.get_messages(conversation_id)?;
        Ok(rows.into_iter().map(Message::from).collect())
    }

    /// Conversations of one owner, most recently updated first.
    pub fn list_for_owner(&self, owner_id: Uuid) -> ConversationResult<Vec<Conversation>> {
        let rows = self.db.list_conversations_for_owner(owner_id)?;
        Ok(rows.into_iter().map(Conversation::from).collect())
    }

    /// Remove a conversation and every message in it.
    pub fn delete(&self, conversation_id: Uuid, requester_id: Uuid) -> ConversationResult<()> {
        self.owned_by(conversation_id, requester_id)?;
        if !self.db.delete_conversation(conversation_id)? {
            return Err(ConversationError::NotFound);
        }
        info!("Conversation {} deleted by {}", conversation_id, requester_id);
        Ok(())
    }

    /// Set the pin flag and refresh `updated_at`. Setting the current value
    /// again succeeds.
    pub fn toggle_pin(
        &self,
        conversation_id: Uuid,
        requester_id: Uuid,
        pinned: bool,
    ) -> ConversationResult<PinState> {
        self.owned_by(conversation_id, requester_id)?;
        if !self.db.set_conversation_pinned(conversation_id, pinned, chatkeep_db::now())? {
            return Err(ConversationError::NotFound);
        }
        Ok(PinState {
            conversation_id,
            is_pinned: pinned,
        })
    }

    fn owned_by(&self, conversation_id: Uuid, requester_id: Uuid) -> ConversationResult<Conversation> {
        let conversation = self.get(conversation_id)?;
        match authorize(requester_id, conversation.owner_id) {
            Access::Allowed => Ok(conversation),
            Access::Forbidden => {
                warn!(
                    "User {} denied access to conversation {} owned by {}",
                    requester_id, conversation_id, conversation.owner_id
                );
                Err(ConversationError::Forbidden)
            }
        }
    }
}
