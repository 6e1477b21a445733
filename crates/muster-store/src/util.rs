//! Row-mapping helpers shared by the CRUD modules.

use chrono::{DateTime, Utc};
use uuid::Uuid;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

fn conversion_failure(idx: usize, err: impl Into<BoxError>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, err.into())
}

/// Parse a TEXT column holding a UUID.
pub(crate) fn parse_uuid(idx: usize, s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| conversion_failure(idx, e))
}

/// Parse an optional TEXT column holding a UUID.
pub(crate) fn parse_opt_uuid(idx: usize, s: Option<&str>) -> rusqlite::Result<Option<Uuid>> {
    s.map(|v| parse_uuid(idx, v)).transpose()
}

/// Parse a TEXT column holding an RFC-3339 timestamp.
pub(crate) fn parse_ts(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_failure(idx, e))
}

/// Parse an optional TEXT column holding an RFC-3339 timestamp.
pub(crate) fn parse_opt_ts(idx: usize, s: Option<&str>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    s.map(|v| parse_ts(idx, v)).transpose()
}

/// Parse a TEXT column holding a string-encoded enum via `from_str`.
pub(crate) fn parse_enum<T>(
    idx: usize,
    s: &str,
    from_str: fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    from_str(s).ok_or_else(|| conversion_failure(idx, format!("unknown enum value: {s}")))
}

#[cfg(test)]
pub(crate) mod testutil {
    use chrono::Utc;
    use muster_shared::CanonicalPair;
    use uuid::Uuid;

    use crate::models::{Conversation, Duty};
    use crate::Database;

    /// Open a throwaway database in a temp directory.  The directory must be
    /// kept alive for the duration of the test.
    pub(crate) fn open_temp() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).expect("should open");
        (dir, db)
    }

    /// Insert a duty mirror row with a fresh creator.
    pub(crate) fn seed_duty(db: &Database, title: &str) -> Duty {
        let duty = Duty {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: None,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
        };
        db.upsert_duty(&duty).unwrap();
        duty
    }

    /// An empty conversation between two users, in canonical order.
    pub(crate) fn fresh_conversation(a: Uuid, b: Uuid) -> Conversation {
        let pair = CanonicalPair::new(a, b);
        let now = Utc::now();
        Conversation {
            id: Uuid::new_v4(),
            user_low: pair.low,
            user_high: pair.high,
            last_message_id: None,
            last_message_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
