//! v001 -- Initial schema creation.
//!
//! Creates the social-core tables plus the read-only mirrors of the
//! externally-owned `users` and `duties` collections.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users (external mirror; used for notification display names)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id           TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    display_name TEXT,
    created_at   TEXT NOT NULL                -- ISO-8601 / RFC-3339
);

-- ----------------------------------------------------------------
-- Duties (external mirror; read-only to this core)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS duties (
    id          TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    title       TEXT NOT NULL,
    description TEXT,
    created_by  TEXT NOT NULL,                -- user UUID
    created_at  TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Friendships: one undirected edge per user pair. The pair is stored
-- in canonical (sorted) order; initiated_by preserves who asked.
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS friendships (
    id           TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    user_low     TEXT NOT NULL,
    user_high    TEXT NOT NULL,
    initiated_by TEXT NOT NULL,               -- one of user_low / user_high
    status       TEXT NOT NULL,               -- 'pending' | 'accepted'
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,

    CHECK (user_low < user_high)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_friendships_pair
    ON friendships(user_low, user_high);

-- ----------------------------------------------------------------
-- Conversations: exactly one per friend pair, canonical order.
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    id              TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    user_low        TEXT NOT NULL,
    user_high       TEXT NOT NULL,
    last_message_id TEXT,                       -- nullable FK -> messages(id)
    last_message_at TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,

    CHECK (user_low < user_high)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_conversations_pair
    ON conversations(user_low, user_high);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id              TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    conversation_id TEXT NOT NULL,              -- FK -> conversations(id)
    sender          TEXT NOT NULL,              -- user UUID
    content         TEXT NOT NULL,
    read            INTEGER NOT NULL DEFAULT 0, -- boolean 0/1
    read_at         TEXT,
    created_at      TEXT NOT NULL,

    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_ts
    ON messages(conversation_id, created_at ASC);

CREATE INDEX IF NOT EXISTS idx_messages_unread
    ON messages(conversation_id, read);

-- ----------------------------------------------------------------
-- Notifications
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS notifications (
    id                 TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    user_id            TEXT NOT NULL,              -- recipient UUID
    kind               TEXT NOT NULL,
    title              TEXT NOT NULL,
    body               TEXT NOT NULL,
    related_user       TEXT,
    related_duty       TEXT,
    related_friendship TEXT,
    read               INTEGER NOT NULL DEFAULT 0,
    read_at            TEXT,
    created_at         TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_notifications_user_read
    ON notifications(user_id, read);

-- ----------------------------------------------------------------
-- Duty applications: at most one per (duty, applicant)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS applications (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    duty_id    TEXT NOT NULL,                 -- FK -> duties(id)
    applicant  TEXT NOT NULL,                 -- user UUID
    status     TEXT NOT NULL,                 -- 'pending' | 'accepted' | 'rejected'
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    FOREIGN KEY (duty_id) REFERENCES duties(id) ON DELETE CASCADE
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_applications_duty_applicant
    ON applications(duty_id, applicant);

-- ----------------------------------------------------------------
-- Groups: at most one per duty
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS groups (
    id          TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    duty_id     TEXT NOT NULL UNIQUE,         -- FK -> duties(id)
    name        TEXT NOT NULL,
    description TEXT,
    created_by  TEXT NOT NULL,                -- user UUID
    created_at  TEXT NOT NULL,

    FOREIGN KEY (duty_id) REFERENCES duties(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS group_members (
    group_id TEXT NOT NULL,                   -- FK -> groups(id)
    user_id  TEXT NOT NULL,
    added_at TEXT NOT NULL,

    PRIMARY KEY (group_id, user_id),
    FOREIGN KEY (group_id) REFERENCES groups(id) ON DELETE CASCADE
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
