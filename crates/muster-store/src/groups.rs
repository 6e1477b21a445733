//! CRUD operations for [`Group`] records and their membership sets.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Group;
use crate::util::{parse_ts, parse_uuid};

impl Database {
    /// Insert a new group.
    ///
    /// The unique constraint on `duty_id` keeps the 1:1 duty/group mapping;
    /// racing creators re-read on violation.
    pub fn insert_group(&self, group: &Group) -> Result<()> {
        self.conn().execute(
            "INSERT INTO groups (id, duty_id, name, description, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                group.id.to_string(),
                group.duty_id.to_string(),
                group.name,
                group.description,
                group.created_by.to_string(),
                group.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch a single group by id.
    pub fn get_group(&self, id: Uuid) -> Result<Group> {
        self.conn()
            .query_row(
                "SELECT id, duty_id, name, description, created_by, created_at
                 FROM groups WHERE id = ?1",
                params![id.to_string()],
                row_to_group,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Fetch the group for a duty, if any.
    pub fn find_group_for_duty(&self, duty_id: Uuid) -> Result<Option<Group>> {
        let group = self
            .conn()
            .query_row(
                "SELECT id, duty_id, name, description, created_by, created_at
                 FROM groups WHERE duty_id = ?1",
                params![duty_id.to_string()],
                row_to_group,
            )
            .optional()?;
        Ok(group)
    }

    /// Add a member to a group.  Adding an existing member is a silent
    /// no-op (set semantics).  Returns `true` if the member was new.
    pub fn add_group_member(&self, group_id: Uuid, user_id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO group_members (group_id, user_id, added_at)
             VALUES (?1, ?2, ?3)",
            params![group_id.to_string(), user_id.to_string(), at.to_rfc3339()],
        )?;
        Ok(affected > 0)
    }

    /// Remove a member from a group.  Returns `true` if a row was deleted.
    pub fn remove_group_member(&self, group_id: Uuid, user_id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
            params![group_id.to_string(), user_id.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// All member user ids of a group, in join order.
    pub fn list_group_members(&self, group_id: Uuid) -> Result<Vec<Uuid>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id FROM group_members WHERE group_id = ?1 ORDER BY added_at ASC",
        )?;

        let rows = stmt.query_map(params![group_id.to_string()], |row| {
            let user_id: String = row.get(0)?;
            parse_uuid(0, &user_id)
        })?;

        let mut members = Vec::new();
        for row in rows {
            members.push(row?);
        }
        Ok(members)
    }

    /// Whether a user is a member of a group.
    pub fn is_group_member(&self, group_id: Uuid, user_id: Uuid) -> Result<bool> {
        let found = self
            .conn()
            .query_row(
                "SELECT 1 FROM group_members WHERE group_id = ?1 AND user_id = ?2",
                params![group_id.to_string(), user_id.to_string()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

/// Map a `rusqlite::Row` to a [`Group`].
fn row_to_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<Group> {
    let id: String = row.get(0)?;
    let duty_id: String = row.get(1)?;
    let name: String = row.get(2)?;
    let description: Option<String> = row.get(3)?;
    let created_by: String = row.get(4)?;
    let created_at: String = row.get(5)?;

    Ok(Group {
        id: parse_uuid(0, &id)?,
        duty_id: parse_uuid(1, &duty_id)?,
        name,
        description,
        created_by: parse_uuid(4, &created_by)?,
        created_at: parse_ts(5, &created_at)?,
    })
}
