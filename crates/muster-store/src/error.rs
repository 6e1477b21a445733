use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// UUID parsing error.
    #[error("UUID error: {0}")]
    Uuid(#[from] uuid::Error),

    /// Chrono parsing error.
    #[error("Timestamp parse error: {0}")]
    ChronoParse(#[from] chrono::ParseError),
}

impl StoreError {
    /// Whether this error is a SQLite uniqueness-constraint violation.
    ///
    /// The create-or-fetch paths (friendships, conversations, groups) probe
    /// this after a failed insert and re-read the winning row instead of
    /// surfacing the conflict to the caller.
    ///
    /// Only the UNIQUE/PRIMARY KEY extended codes count; CHECK, NOT NULL
    /// and foreign key failures have no winning row to re-read and must
    /// surface as errors.
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        )
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::testutil::open_temp;

    #[test]
    fn probe_ignores_non_unique_constraints() {
        let (_dir, db) = open_temp();

        // Fires the CHECK (user_low < user_high) on friendships: a
        // constraint violation, but not a unique one.
        let err = db
            .conn()
            .execute(
                "INSERT INTO friendships
                     (id, user_low, user_high, initiated_by, status, created_at, updated_at)
                 VALUES ('f', 'b', 'a', 'b', 'pending', 't', 't')",
                [],
            )
            .map_err(StoreError::from)
            .unwrap_err();
        assert!(!err.is_unique_violation());

        // A NOT NULL failure is also excluded.
        let err = db
            .conn()
            .execute("INSERT INTO duties (id) VALUES ('d')", [])
            .map_err(StoreError::from)
            .unwrap_err();
        assert!(!err.is_unique_violation());
    }
}
