//! CRUD operations for [`Notification`] records.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use muster_shared::NotificationKind;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Notification;
use crate::util::{parse_enum, parse_opt_ts, parse_opt_uuid, parse_ts, parse_uuid};

impl Database {
    /// Insert a new notification.
    pub fn insert_notification(&self, notification: &Notification) -> Result<()> {
        self.conn().execute(
            "INSERT INTO notifications
                 (id, user_id, kind, title, body, related_user, related_duty,
                  related_friendship, read, read_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                notification.id.to_string(),
                notification.user_id.to_string(),
                notification.kind.as_str(),
                notification.title,
                notification.body,
                notification.related_user.map(|u| u.to_string()),
                notification.related_duty.map(|d| d.to_string()),
                notification.related_friendship.map(|f| f.to_string()),
                notification.read as i64,
                notification.read_at.map(|t| t.to_rfc3339()),
                notification.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch a single notification by id.
    pub fn get_notification(&self, id: Uuid) -> Result<Notification> {
        self.conn()
            .query_row(
                "SELECT id, user_id, kind, title, body, related_user, related_duty,
                        related_friendship, read, read_at, created_at
                 FROM notifications WHERE id = ?1",
                params![id.to_string()],
                row_to_notification,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List a user's notifications, newest first.
    pub fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: u32,
    ) -> Result<Vec<Notification>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, user_id, kind, title, body, related_user, related_duty,
                    related_friendship, read, read_at, created_at
             FROM notifications
             WHERE user_id = ?1 AND (?2 = 0 OR read = 0)
             ORDER BY created_at DESC
             LIMIT ?3",
        )?;

        let rows = stmt.query_map(
            params![user_id.to_string(), unread_only as i64, limit],
            row_to_notification,
        )?;

        let mut notifications = Vec::new();
        for row in rows {
            notifications.push(row?);
        }
        Ok(notifications)
    }

    /// Page through a user's unread notifications in creation order.
    ///
    /// `after` is the keyset cursor (created_at, id) of the previous page's
    /// last row; `None` starts from the oldest.  The push poll loop walks
    /// the whole unread backlog with this, so no notification can hide
    /// behind a fixed-size newest-first window.
    pub fn list_unread_notifications_after(
        &self,
        user_id: Uuid,
        after: Option<(DateTime<Utc>, Uuid)>,
        limit: u32,
    ) -> Result<Vec<Notification>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, user_id, kind, title, body, related_user, related_duty,
                    related_friendship, read, read_at, created_at
             FROM notifications
             WHERE user_id = ?1 AND read = 0
               AND (?2 IS NULL OR created_at > ?2 OR (created_at = ?2 AND id > ?3))
             ORDER BY created_at ASC, id ASC
             LIMIT ?4",
        )?;

        let cursor_ts = after.map(|(t, _)| t.to_rfc3339());
        let cursor_id = after.map(|(_, id)| id.to_string());
        let rows = stmt.query_map(
            params![user_id.to_string(), cursor_ts, cursor_id, limit],
            row_to_notification,
        )?;

        let mut notifications = Vec::new();
        for row in rows {
            notifications.push(row?);
        }
        Ok(notifications)
    }

    /// Count a user's unread notifications.
    pub fn count_unread_notifications(&self, user_id: Uuid) -> Result<u32> {
        let count: u32 = self.conn().query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND read = 0",
            params![user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Mark one notification read.
    pub fn mark_notification_read(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "UPDATE notifications SET read = 1, read_at = ?2 WHERE id = ?1 AND read = 0",
            params![id.to_string(), at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Mark all of a user's notifications read.  Returns the number marked.
    pub fn mark_all_notifications_read(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE notifications SET read = 1, read_at = ?2 WHERE user_id = ?1 AND read = 0",
            params![user_id.to_string(), at.to_rfc3339()],
        )?;
        Ok(affected)
    }

    /// Delete a notification by id.  Returns `true` if a row was deleted.
    pub fn delete_notification(&self, id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM notifications WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }
}

/// Map a `rusqlite::Row` to a [`Notification`].
fn row_to_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let kind: String = row.get(2)?;
    let title: String = row.get(3)?;
    let body: String = row.get(4)?;
    let related_user: Option<String> = row.get(5)?;
    let related_duty: Option<String> = row.get(6)?;
    let related_friendship: Option<String> = row.get(7)?;
    let read: i64 = row.get(8)?;
    let read_at: Option<String> = row.get(9)?;
    let created_at: String = row.get(10)?;

    Ok(Notification {
        id: parse_uuid(0, &id)?,
        user_id: parse_uuid(1, &user_id)?,
        kind: parse_enum(2, &kind, NotificationKind::from_str)?,
        title,
        body,
        related_user: parse_opt_uuid(5, related_user.as_deref())?,
        related_duty: parse_opt_uuid(6, related_duty.as_deref())?,
        related_friendship: parse_opt_uuid(7, related_friendship.as_deref())?,
        read: read != 0,
        read_at: parse_opt_ts(9, read_at.as_deref())?,
        created_at: parse_ts(10, &created_at)?,
    })
}
