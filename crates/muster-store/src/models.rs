//! Domain model structs persisted in the local SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use muster_shared::{ApplicationStatus, CanonicalPair, FriendStatus, NotificationKind};

// ---------------------------------------------------------------------------
// User (external mirror)
// ---------------------------------------------------------------------------

/// A mirror row of the externally-owned User entity.  Only the fields needed
/// to render notification templates are kept here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRef {
    pub id: Uuid,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Duty (external mirror)
// ---------------------------------------------------------------------------

/// A mirror row of the externally-owned Duty entity, read-only to this core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Duty {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    /// User id of the duty's creator; becomes the group creator.
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Friendship
// ---------------------------------------------------------------------------

/// An undirected friend edge between two users.
///
/// The pair is stored in canonical (sorted) order so that at most one row
/// can exist per unordered pair; `initiated_by` preserves who sent the
/// original request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Friendship {
    pub id: Uuid,
    pub user_low: Uuid,
    pub user_high: Uuid,
    pub initiated_by: Uuid,
    pub status: FriendStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Friendship {
    /// The canonical user pair this edge connects.
    pub fn pair(&self) -> CanonicalPair {
        CanonicalPair {
            low: self.user_low,
            high: self.user_high,
        }
    }

    /// The user who received the original request.
    pub fn recipient(&self) -> Uuid {
        self.pair().other(self.initiated_by)
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// The single message channel between two (accepted) friends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: Uuid,
    pub user_low: Uuid,
    pub user_high: Uuid,
    pub last_message_id: Option<Uuid>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn pair(&self) -> CanonicalPair {
        CanonicalPair {
            low: self.user_low,
            high: self.user_high,
        }
    }
}

/// A conversation annotated for one participant's inbox view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation: Conversation,
    /// The other participant, resolved for the querying user.
    pub other_user: Uuid,
    /// The most recent message, if any.
    pub last_message: Option<Message>,
    /// Messages in this conversation not sent by the querying user and not
    /// yet read.
    pub unread_count: u32,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message.  Immutable except for the read flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: Uuid,
    pub content: String,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// A typed notification created as a side effect of a social transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub id: Uuid,
    /// The recipient.
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub related_user: Option<Uuid>,
    pub related_duty: Option<Uuid>,
    pub related_friendship: Option<Uuid>,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Duty application
// ---------------------------------------------------------------------------

/// A user's application to a duty.  At most one per (duty, applicant).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DutyApplication {
    pub id: Uuid,
    pub duty_id: Uuid,
    pub applicant: Uuid,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

/// The membership group associated 1:1 with a duty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub id: Uuid,
    pub duty_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}
