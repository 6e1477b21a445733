//! Mirror of the externally-owned User collection.
//!
//! The social core does not own users; this table exists so that
//! notification templates can render display names without calling back
//! into the identity service.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::database::Database;
use crate::error::Result;
use crate::models::UserRef;
use crate::util::{parse_ts, parse_uuid};

impl Database {
    /// Insert or refresh a user mirror row.
    pub fn upsert_user(&self, user: &UserRef) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, display_name, created_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name",
            params![
                user.id.to_string(),
                user.display_name,
                user.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch a user mirror row, if present.
    pub fn find_user(&self, id: Uuid) -> Result<Option<UserRef>> {
        let user = self
            .conn()
            .query_row(
                "SELECT id, display_name, created_at FROM users WHERE id = ?1",
                params![id.to_string()],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Display name for a user, falling back to the id when the mirror has
    /// no row (or no name).  Never fails on a missing user.
    pub fn display_name_for(&self, id: Uuid) -> Result<String> {
        let name = self
            .find_user(id)?
            .and_then(|u| u.display_name)
            .unwrap_or_else(|| id.to_string());
        Ok(name)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRef> {
    let id: String = row.get(0)?;
    let display_name: Option<String> = row.get(1)?;
    let created_at: String = row.get(2)?;

    Ok(UserRef {
        id: parse_uuid(0, &id)?,
        display_name,
        created_at: parse_ts(2, &created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::testutil::open_temp;
    use chrono::Utc;

    #[test]
    fn display_name_falls_back_to_id() {
        let (_dir, db) = open_temp();
        let id = Uuid::new_v4();

        assert_eq!(db.display_name_for(id).unwrap(), id.to_string());

        db.upsert_user(&UserRef {
            id,
            display_name: Some("Ada".into()),
            created_at: Utc::now(),
        })
        .unwrap();
        assert_eq!(db.display_name_for(id).unwrap(), "Ada");

        // Upsert replaces the name instead of conflicting.
        db.upsert_user(&UserRef {
            id,
            display_name: Some("Grace".into()),
            created_at: Utc::now(),
        })
        .unwrap();
        assert_eq!(db.display_name_for(id).unwrap(), "Grace");
    }
}
