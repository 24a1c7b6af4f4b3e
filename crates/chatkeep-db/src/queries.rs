use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use crate::models::{ConversationRow, MessageRow, UserRow};
use crate::{Database, DbResult, format_timestamp};

/// Result of an attempted message append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    ConversationMissing,
    /// The parent id does not name a message of the same conversation.
    ParentMissing,
}

const USER_COLUMNS: &str =
    "id, email, username, password_hash, first_name, last_name, created_at, updated_at";
const CONVERSATION_COLUMNS: &str =
    "id, owner_id, title, model_used, is_pinned, created_at, updated_at";
const MESSAGE_COLUMNS: &str =
    "id, conversation_id, parent_message_id, sender, content, metadata, timestamp";

impl Database {
    // -- Users --

    pub fn insert_user(&self, user: &UserRow) -> DbResult<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, username, password_hash, first_name, last_name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    user.id.to_string(),
                    user.email,
                    user.username,
                    user.password_hash,
                    user.first_name,
                    user.last_name,
                    format_timestamp(user.created_at),
                    format_timestamp(user.updated_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: Uuid) -> DbResult<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", &id.to_string()))
    }

    pub fn get_user_by_email(&self, email: &str) -> DbResult<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn email_exists(&self, email: &str) -> DbResult<bool> {
        self.with_conn(|conn| exists(conn, "SELECT 1 FROM users WHERE email = ?1", email))
    }

    pub fn username_exists(&self, username: &str) -> DbResult<bool> {
        self.with_conn(|conn| exists(conn, "SELECT 1 FROM users WHERE username = ?1", username))
    }

    /// Overwrite the mutable profile columns. Returns false if the user is gone.
    pub fn update_user(&self, user: &UserRow) -> DbResult<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users
                 SET email = ?2, username = ?3, first_name = ?4, last_name = ?5, updated_at = ?6
                 WHERE id = ?1",
                params![
                    user.id.to_string(),
                    user.email,
                    user.username,
                    user.first_name,
                    user.last_name,
                    format_timestamp(user.updated_at),
                ],
            )?;
            Ok(changed > 0)
        })
    }

    /// Deletes the user; conversations and messages follow via ON DELETE CASCADE.
    pub fn delete_user(&self, id: Uuid) -> DbResult<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute("DELETE FROM users WHERE id = ?1", [id.to_string()])?;
            Ok(changed > 0)
        })
    }

    // -- Conversations --

    pub fn insert_conversation(&self, conversation: &ConversationRow) -> DbResult<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO conversations (id, owner_id, title, model_used, is_pinned, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    conversation.id.to_string(),
                    conversation.owner_id.to_string(),
                    conversation.title,
                    conversation.model_used,
                    conversation.is_pinned,
                    format_timestamp(conversation.created_at),
                    format_timestamp(conversation.updated_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_conversation(&self, id: Uuid) -> DbResult<Option<ConversationRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1");
            let row = conn
                .query_row(&sql, [id.to_string()], conversation_from_row)
                .optional()?;
            Ok(row)
        })
    }

    /// Most recently active first.
    pub fn list_conversations_for_owner(&self, owner_id: Uuid) -> DbResult<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations
                 WHERE owner_id = ?1
                 ORDER BY updated_at DESC, rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([owner_id.to_string()], conversation_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Set the pin flag and bump `updated_at` to `at`, even when the flag
    /// already had that value. `updated_at` never moves backwards.
    pub fn set_conversation_pinned(
        &self,
        id: Uuid,
        pinned: bool,
        at: DateTime<Utc>,
    ) -> DbResult<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE conversations SET is_pinned = ?2, updated_at = MAX(updated_at, ?3)
                 WHERE id = ?1",
                params![id.to_string(), pinned, format_timestamp(at)],
            )?;
            Ok(changed > 0)
        })
    }

    /// Remove a conversation together with all of its messages in one
    /// transaction. Returns false if the conversation did not exist.
    pub fn delete_conversation(&self, id: Uuid) -> DbResult<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            let id = id.to_string();
            tx.execute("DELETE FROM messages WHERE conversation_id = ?1", [&id])?;
            let changed = tx.execute("DELETE FROM conversations WHERE id = ?1", [&id])?;
            tx.commit()?;
            Ok(changed > 0)
        })
    }

    // -- Messages --

    /// Insert a message and bump the owning conversation's `updated_at` to
    /// the message timestamp, atomically. Nothing is written unless both the
    /// conversation and (if given) the parent message exist.
    ///
    /// Timestamps are taken before the writer lock, so appends can commit out
    /// of timestamp order; the bump keeps the later of the two values.
    pub fn append_message(&self, message: &MessageRow) -> DbResult<AppendOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            let conversation_id = message.conversation_id.to_string();

            let bumped = tx.execute(
                "UPDATE conversations SET updated_at = MAX(updated_at, ?2) WHERE id = ?1",
                params![conversation_id, format_timestamp(message.timestamp)],
            )?;
            if bumped == 0 {
                return Ok(AppendOutcome::ConversationMissing);
            }

            if let Some(parent) = message.parent_message_id {
                let parent_ok = tx
                    .query_row(
                        "SELECT 1 FROM messages WHERE id = ?1 AND conversation_id = ?2",
                        params![parent.to_string(), conversation_id],
                        |_| Ok(()),
                    )
                    .optional()?
                    .is_some();
                if !parent_ok {
                    return Ok(AppendOutcome::ParentMissing);
                }
            }

            tx.execute(
                "INSERT INTO messages (id, conversation_id, parent_message_id, sender, content, metadata, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    message.id.to_string(),
                    conversation_id,
                    message.parent_message_id.map(|p| p.to_string()),
                    message.sender.as_str(),
                    message.content,
                    message.metadata,
                    format_timestamp(message.timestamp),
                ],
            )?;

            tx.commit()?;
            Ok(AppendOutcome::Appended)
        })
    }

    /// Oldest first; messages sharing a timestamp keep insertion order.
    pub fn get_messages(&self, conversation_id: Uuid) -> DbResult<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY timestamp ASC, rowid ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([conversation_id.to_string()], message_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_messages(&self, conversation_id: Uuid) -> DbResult<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
                [conversation_id.to_string()],
                |r| r.get(0),
            )?;
            Ok(count)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> DbResult<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    let row = conn.query_row(&sql, [value], user_from_row).optional()?;
    Ok(row)
}

fn exists(conn: &Connection, sql: &str, value: &str) -> DbResult<bool> {
    let found = conn.query_row(sql, [value], |_| Ok(())).optional()?;
    Ok(found.is_some())
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: uuid_at(row, 0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        password_hash: row.get(3)?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        created_at: timestamp_at(row, 6)?,
        updated_at: timestamp_at(row, 7)?,
    })
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: uuid_at(row, 0)?,
        owner_id: uuid_at(row, 1)?,
        title: row.get(2)?,
        model_used: row.get(3)?,
        is_pinned: row.get(4)?,
        created_at: timestamp_at(row, 5)?,
        updated_at: timestamp_at(row, 6)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    let parent_message_id = row
        .get::<_, Option<String>>(2)?
        .map(|raw| raw.parse().map_err(|e| conversion_error(2, e)))
        .transpose()?;
    let sender: String = row.get(3)?;

    Ok(MessageRow {
        id: uuid_at(row, 0)?,
        conversation_id: uuid_at(row, 1)?,
        parent_message_id,
        sender: sender.parse().map_err(|e| conversion_error(3, e))?,
        content: row.get(4)?,
        metadata: row.get(5)?,
        timestamp: timestamp_at(row, 6)?,
    })
}

fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}
