//! CRUD operations for [`Friendship`] records.

use rusqlite::{params, OptionalExtension};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use muster_shared::{CanonicalPair, FriendStatus};

use crate::database::Database;
use crate::error::Result;
use crate::models::Friendship;
use crate::util::{parse_enum, parse_ts, parse_uuid};

impl Database {
    /// Insert a new friendship edge.
    ///
    /// The unique index on the canonical pair rejects a second edge for the
    /// same two users; callers racing on first contact probe
    /// [`StoreError::is_unique_violation`] and re-read instead of failing.
    ///
    /// [`StoreError::is_unique_violation`]: crate::StoreError::is_unique_violation
    pub fn insert_friendship(&self, friendship: &Friendship) -> Result<()> {
        self.conn().execute(
            "INSERT INTO friendships (id, user_low, user_high, initiated_by, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                friendship.id.to_string(),
                friendship.user_low.to_string(),
                friendship.user_high.to_string(),
                friendship.initiated_by.to_string(),
                friendship.status.as_str(),
                friendship.created_at.to_rfc3339(),
                friendship.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch the edge for an unordered user pair, if any.
    pub fn find_friendship(&self, pair: CanonicalPair) -> Result<Option<Friendship>> {
        let friendship = self
            .conn()
            .query_row(
                "SELECT id, user_low, user_high, initiated_by, status, created_at, updated_at
                 FROM friendships
                 WHERE user_low = ?1 AND user_high = ?2",
                params![pair.low.to_string(), pair.high.to_string()],
                row_to_friendship,
            )
            .optional()?;
        Ok(friendship)
    }

    /// Update the status of an existing edge.
    pub fn set_friendship_status(
        &self,
        id: Uuid,
        status: FriendStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn().execute(
            "UPDATE friendships SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), status.as_str(), updated_at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Delete the edge for a pair.  Returns `true` if a row was deleted.
    pub fn delete_friendship(&self, pair: CanonicalPair) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM friendships WHERE user_low = ?1 AND user_high = ?2",
            params![pair.low.to_string(), pair.high.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// List all accepted edges touching a user.
    pub fn list_accepted_friendships(&self, user_id: Uuid) -> Result<Vec<Friendship>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, user_low, user_high, initiated_by, status, created_at, updated_at
             FROM friendships
             WHERE status = 'accepted' AND (user_low = ?1 OR user_high = ?1)
             ORDER BY updated_at DESC",
        )?;

        let rows = stmt.query_map(params![user_id.to_string()], row_to_friendship)?;

        let mut friendships = Vec::new();
        for row in rows {
            friendships.push(row?);
        }
        Ok(friendships)
    }
}

/// Map a `rusqlite::Row` to a [`Friendship`].
fn row_to_friendship(row: &rusqlite::Row<'_>) -> rusqlite::Result<Friendship> {
    let id: String = row.get(0)?;
    let user_low: String = row.get(1)?;
    let user_high: String = row.get(2)?;
    let initiated_by: String = row.get(3)?;
    let status: String = row.get(4)?;
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;

    Ok(Friendship {
        id: parse_uuid(0, &id)?,
        user_low: parse_uuid(1, &user_low)?,
        user_high: parse_uuid(2, &user_high)?,
        initiated_by: parse_uuid(3, &initiated_by)?,
        status: parse_enum(4, &status, FriendStatus::from_str)?,
        created_at: parse_ts(5, &created_at)?,
        updated_at: parse_ts(6, &updated_at)?,
    })
}
