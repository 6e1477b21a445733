//! Mirror of the externally-owned Duty collection (read-only to this core).

use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Duty;
use crate::util::{parse_ts, parse_uuid};

impl Database {
    /// Insert or refresh a duty mirror row.
    pub fn upsert_duty(&self, duty: &Duty) -> Result<()> {
        self.conn().execute(
            "INSERT INTO duties (id, title, description, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                 title = excluded.title,
                 description = excluded.description",
            params![
                duty.id.to_string(),
                duty.title,
                duty.description,
                duty.created_by.to_string(),
                duty.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch a duty by id.
    pub fn get_duty(&self, id: Uuid) -> Result<Duty> {
        self.conn()
            .query_row(
                "SELECT id, title, description, created_by, created_at
                 FROM duties WHERE id = ?1",
                params![id.to_string()],
                row_to_duty,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }
}

fn row_to_duty(row: &rusqlite::Row<'_>) -> rusqlite::Result<Duty> {
    let id: String = row.get(0)?;
    let title: String = row.get(1)?;
    let description: Option<String> = row.get(2)?;
    let created_by: String = row.get(3)?;
    let created_at: String = row.get(4)?;

    Ok(Duty {
        id: parse_uuid(0, &id)?,
        title,
        description,
        created_by: parse_uuid(3, &created_by)?,
        created_at: parse_ts(4, &created_at)?,
    })
}
