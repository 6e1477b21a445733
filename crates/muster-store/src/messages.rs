//! CRUD operations for [`Message`] records, including read tracking.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Message;
use crate::util::{parse_opt_ts, parse_ts, parse_uuid};

impl Database {
    /// Append a message to its conversation.
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.conn().execute(
            "INSERT INTO messages (id, conversation_id, sender, content, read, read_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                message.id.to_string(),
                message.conversation_id.to_string(),
                message.sender.to_string(),
                message.content,
                message.read as i64,
                message.read_at.map(|t| t.to_rfc3339()),
                message.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch a single message by id.
    pub fn get_message(&self, id: Uuid) -> Result<Message> {
        self.conn()
            .query_row(
                "SELECT id, conversation_id, sender, content, read, read_at, created_at
                 FROM messages WHERE id = ?1",
                params![id.to_string()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// All messages of a conversation in creation order (ascending).
    pub fn list_messages_for_conversation(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, conversation_id, sender, content, read, read_at, created_at
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY created_at ASC",
        )?;

        let rows = stmt.query_map(params![conversation_id.to_string()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Count messages in a conversation that `reader` has not yet read.
    pub fn count_unread_messages(&self, conversation_id: Uuid, reader: Uuid) -> Result<u32> {
        let count: u32 = self.conn().query_row(
            "SELECT COUNT(*) FROM messages
             WHERE conversation_id = ?1 AND sender != ?2 AND read = 0",
            params![conversation_id.to_string(), reader.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Mark all of the counterparty's unread messages in a conversation as
    /// read.  Returns the number of messages marked.
    pub fn mark_conversation_read(
        &self,
        conversation_id: Uuid,
        reader: Uuid,
        at: DateTime<Utc>,
    ) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE messages SET read = 1, read_at = ?3
             WHERE conversation_id = ?1 AND sender != ?2 AND read = 0",
            params![
                conversation_id.to_string(),
                reader.to_string(),
                at.to_rfc3339(),
            ],
        )?;
        Ok(affected)
    }

    /// Mark a single message as read.
    pub fn mark_message_read(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "UPDATE messages SET read = 1, read_at = ?2 WHERE id = ?1 AND read = 0",
            params![id.to_string(), at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// All unread messages addressed to a user, across every conversation
    /// they participate in.  Used by the push poll loop.
    pub fn list_unread_messages_for_user(&self, user_id: Uuid) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT m.id, m.conversation_id, m.sender, m.content, m.read, m.read_at, m.created_at
             FROM messages m
             JOIN conversations c ON c.id = m.conversation_id
             WHERE (c.user_low = ?1 OR c.user_high = ?1)
               AND m.sender != ?1
               AND m.read = 0
             ORDER BY m.created_at ASC",
        )?;

        let rows = stmt.query_map(params![user_id.to_string()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }
}

/// Map a `rusqlite::Row` to a [`Message`].
fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id: String = row.get(0)?;
    let conversation_id: String = row.get(1)?;
    let sender: String = row.get(2)?;
    let content: String = row.get(3)?;
    let read: i64 = row.get(4)?;
    let read_at: Option<String> = row.get(5)?;
    let created_at: String = row.get(6)?;

    Ok(Message {
        id: parse_uuid(0, &id)?,
        conversation_id: parse_uuid(1, &conversation_id)?,
        sender: parse_uuid(2, &sender)?,
        content,
        read: read != 0,
        read_at: parse_opt_ts(5, read_at.as_deref())?,
        created_at: parse_ts(6, &created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::testutil::{fresh_conversation, open_temp};
    use chrono::Duration;

    fn message(conversation_id: Uuid, sender: Uuid, content: &str, at: DateTime<Utc>) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender,
            content: content.to_string(),
            read: false,
            read_at: None,
            created_at: at,
        }
    }

    #[test]
    fn messages_come_back_in_creation_order() {
        let (_dir, db) = open_temp();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let conversation = fresh_conversation(a, b);
        db.insert_conversation(&conversation).unwrap();

        let t0 = Utc::now();
        db.insert_message(&message(conversation.id, a, "second", t0 + Duration::seconds(1)))
            .unwrap();
        db.insert_message(&message(conversation.id, a, "first", t0))
            .unwrap();
        db.insert_message(&message(conversation.id, b, "third", t0 + Duration::seconds(2)))
            .unwrap();

        let contents: Vec<String> = db
            .list_messages_for_conversation(conversation.id)
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[test]
    fn read_marking_only_touches_counterparty_messages() {
        let (_dir, db) = open_temp();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let conversation = fresh_conversation(a, b);
        db.insert_conversation(&conversation).unwrap();

        let now = Utc::now();
        db.insert_message(&message(conversation.id, a, "from a", now))
            .unwrap();
        db.insert_message(&message(conversation.id, b, "from b", now))
            .unwrap();

        assert_eq!(db.count_unread_messages(conversation.id, b).unwrap(), 1);

        // b reads the conversation: only a's message flips.
        let marked = db
            .mark_conversation_read(conversation.id, b, Utc::now())
            .unwrap();
        assert_eq!(marked, 1);
        assert_eq!(db.count_unread_messages(conversation.id, b).unwrap(), 0);
        // a still has b's message unread.
        assert_eq!(db.count_unread_messages(conversation.id, a).unwrap(), 1);

        let read_message = db
            .list_messages_for_conversation(conversation.id)
            .unwrap()
            .into_iter()
            .find(|m| m.sender == a)
            .unwrap();
        assert!(read_message.read);
        assert!(read_message.read_at.is_some());
    }

    #[test]
    fn unread_scan_spans_conversations() {
        let (_dir, db) = open_temp();
        let me = Uuid::new_v4();
        let friend1 = Uuid::new_v4();
        let friend2 = Uuid::new_v4();

        let c1 = fresh_conversation(me, friend1);
        let c2 = fresh_conversation(me, friend2);
        db.insert_conversation(&c1).unwrap();
        db.insert_conversation(&c2).unwrap();

        let now = Utc::now();
        db.insert_message(&message(c1.id, friend1, "hey", now)).unwrap();
        db.insert_message(&message(c2.id, friend2, "hi", now)).unwrap();
        // My own outgoing message never shows up as unread-to-me.
        db.insert_message(&message(c1.id, me, "yo", now)).unwrap();

        let unread = db.list_unread_messages_for_user(me).unwrap();
        assert_eq!(unread.len(), 2);
        assert!(unread.iter().all(|m| m.sender != me));
    }
}
