//! CRUD operations for [`DutyApplication`] records.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use muster_shared::ApplicationStatus;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::DutyApplication;
use crate::util::{parse_enum, parse_ts, parse_uuid};

impl Database {
    /// Insert a new application.
    ///
    /// The unique index on (duty_id, applicant) backstops concurrent
    /// double-applies.
    pub fn insert_application(&self, application: &DutyApplication) -> Result<()> {
        self.conn().execute(
            "INSERT INTO applications (id, duty_id, applicant, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                application.id.to_string(),
                application.duty_id.to_string(),
                application.applicant.to_string(),
                application.status.as_str(),
                application.created_at.to_rfc3339(),
                application.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch a single application by id.
    pub fn get_application(&self, id: Uuid) -> Result<DutyApplication> {
        self.conn()
            .query_row(
                "SELECT id, duty_id, applicant, status, created_at, updated_at
                 FROM applications WHERE id = ?1",
                params![id.to_string()],
                row_to_application,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Fetch the application for a (duty, applicant) pair, if any.
    pub fn find_application(&self, duty_id: Uuid, applicant: Uuid) -> Result<Option<DutyApplication>> {
        let application = self
            .conn()
            .query_row(
                "SELECT id, duty_id, applicant, status, created_at, updated_at
                 FROM applications
                 WHERE duty_id = ?1 AND applicant = ?2",
                params![duty_id.to_string(), applicant.to_string()],
                row_to_application,
            )
            .optional()?;
        Ok(application)
    }

    /// Update an application's status.
    pub fn set_application_status(
        &self,
        id: Uuid,
        status: ApplicationStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn().execute(
            "UPDATE applications SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), status.as_str(), updated_at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// List applications for a duty, optionally filtered by status.
    pub fn list_applications_for_duty(
        &self,
        duty_id: Uuid,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<DutyApplication>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, duty_id, applicant, status, created_at, updated_at
             FROM applications
             WHERE duty_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at ASC",
        )?;

        let rows = stmt.query_map(
            params![duty_id.to_string(), status.map(|s| s.as_str())],
            row_to_application,
        )?;

        let mut applications = Vec::new();
        for row in rows {
            applications.push(row?);
        }
        Ok(applications)
    }
}

/// Map a `rusqlite::Row` to a [`DutyApplication`].
fn row_to_application(row: &rusqlite::Row<'_>) -> rusqlite::Result<DutyApplication> {
    let id: String = row.get(0)?;
    let duty_id: String = row.get(1)?;
    let applicant: String = row.get(2)?;
    let status: String = row.get(3)?;
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;

    Ok(DutyApplication {
        id: parse_uuid(0, &id)?,
        duty_id: parse_uuid(1, &duty_id)?,
        applicant: parse_uuid(2, &applicant)?,
        status: parse_enum(3, &status, ApplicationStatus::from_str)?,
        created_at: parse_ts(4, &created_at)?,
        updated_at: parse_ts(5, &updated_at)?,
    })
}
