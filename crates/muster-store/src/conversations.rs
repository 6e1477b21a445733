//! CRUD operations for [`Conversation`] records and inbox summaries.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use muster_shared::CanonicalPair;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Conversation, ConversationSummary};
use crate::util::{parse_opt_ts, parse_opt_uuid, parse_ts, parse_uuid};

impl Database {
    /// Insert a new conversation.
    ///
    /// The unique index on the canonical pair guarantees at most one row per
    /// unordered participant pair; racing creators re-read on violation.
    pub fn insert_conversation(&self, conversation: &Conversation) -> Result<()> {
        self.conn().execute(
            "INSERT INTO conversations (id, user_low, user_high, last_message_id, last_message_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                conversation.id.to_string(),
                conversation.user_low.to_string(),
                conversation.user_high.to_string(),
                conversation.last_message_id.map(|m| m.to_string()),
                conversation.last_message_at.map(|t| t.to_rfc3339()),
                conversation.created_at.to_rfc3339(),
                conversation.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch a single conversation by id.
    pub fn get_conversation(&self, id: Uuid) -> Result<Conversation> {
        self.conn()
            .query_row(
                "SELECT id, user_low, user_high, last_message_id, last_message_at, created_at, updated_at
                 FROM conversations
                 WHERE id = ?1",
                params![id.to_string()],
                row_to_conversation,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Fetch the conversation for an unordered user pair, if any.
    pub fn find_conversation_for_pair(&self, pair: CanonicalPair) -> Result<Option<Conversation>> {
        let conversation = self
            .conn()
            .query_row(
                "SELECT id, user_low, user_high, last_message_id, last_message_at, created_at, updated_at
                 FROM conversations
                 WHERE user_low = ?1 AND user_high = ?2",
                params![pair.low.to_string(), pair.high.to_string()],
                row_to_conversation,
            )
            .optional()?;
        Ok(conversation)
    }

    /// Record the latest message on a conversation's summary columns.
    pub fn set_conversation_last_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn().execute(
            "UPDATE conversations
             SET last_message_id = ?2, last_message_at = ?3, updated_at = ?3
             WHERE id = ?1",
            params![
                conversation_id.to_string(),
                message_id.to_string(),
                at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// List all conversations touching a user, annotated with the other
    /// participant, the latest message, and the user's unread count.
    ///
    /// Ordered by last activity: `last_message_at` when present, otherwise
    /// the conversation's `updated_at`.
    pub fn list_conversation_summaries(&self, user_id: Uuid) -> Result<Vec<ConversationSummary>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, user_low, user_high, last_message_id, last_message_at, created_at, updated_at
             FROM conversations
             WHERE user_low = ?1 OR user_high = ?1
             ORDER BY COALESCE(last_message_at, updated_at) DESC",
        )?;

        let rows = stmt.query_map(params![user_id.to_string()], row_to_conversation)?;

        let mut summaries = Vec::new();
        for row in rows {
            let conversation = row?;
            let last_message = match conversation.last_message_id {
                Some(message_id) => Some(self.get_message(message_id)?),
                None => None,
            };
            let unread_count = self.count_unread_messages(conversation.id, user_id)?;
            let other_user = conversation.pair().other(user_id);

            summaries.push(ConversationSummary {
                conversation,
                other_user,
                last_message,
                unread_count,
            });
        }
        Ok(summaries)
    }
}

/// Map a `rusqlite::Row` to a [`Conversation`].
fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    let id: String = row.get(0)?;
    let user_low: String = row.get(1)?;
    let user_high: String = row.get(2)?;
    let last_message_id: Option<String> = row.get(3)?;
    let last_message_at: Option<String> = row.get(4)?;
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;

    Ok(Conversation {
        id: parse_uuid(0, &id)?,
        user_low: parse_uuid(1, &user_low)?,
        user_high: parse_uuid(2, &user_high)?,
        last_message_id: parse_opt_uuid(3, last_message_id.as_deref())?,
        last_message_at: parse_opt_ts(4, last_message_at.as_deref())?,
        created_at: parse_ts(5, &created_at)?,
        updated_at: parse_ts(6, &updated_at)?,
    })
}
