use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An unordered pair of user ids in canonical (sorted) order.
///
/// Friend relationships, conversations, and any other undirected edge
/// between two users are keyed by this pair so that `(a, b)` and `(b, a)`
/// always resolve to the same record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CanonicalPair {
    pub low: Uuid,
    pub high: Uuid,
}

impl CanonicalPair {
    /// Build the canonical pair for two users, in either order.
    pub fn new(a: Uuid, b: Uuid) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    /// Given one member of the pair, return the other.
    pub fn other(&self, user_id: Uuid) -> Uuid {
        if user_id == self.low {
            self.high
        } else {
            self.low
        }
    }

    /// Whether `user_id` is one of the two members.
    pub fn contains(&self, user_id: Uuid) -> bool {
        user_id == self.low || user_id == self.high
    }
}

/// Stored state of a friend relationship edge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FriendStatus {
    Pending,
    Accepted,
}

impl FriendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FriendStatus::Pending => "pending",
            FriendStatus::Accepted => "accepted",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(FriendStatus::Pending),
            "accepted" => Some(FriendStatus::Accepted),
            _ => None,
        }
    }
}

/// Relationship status as seen from one user's point of view.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FriendStatusView {
    Accepted,
    /// The caller sent the request and is waiting for the other party.
    PendingSent,
    /// The other party sent the request; the caller may accept it.
    PendingReceived,
}

/// Status of a duty application.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ApplicationStatus::Pending),
            "accepted" => Some(ApplicationStatus::Accepted),
            "rejected" => Some(ApplicationStatus::Rejected),
            _ => None,
        }
    }
}

/// Kinds of notifications the hub knows how to render.
///
/// Kinds are stored as strings; an unrecognized string parses to `None`,
/// which callers treat as "emit nothing" rather than an error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    FriendRequest,
    FriendAccepted,
    Message,
    ApplicationAccepted,
    ApplicationRejected,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::FriendRequest => "friend_request",
            NotificationKind::FriendAccepted => "friend_accepted",
            NotificationKind::Message => "message",
            NotificationKind::ApplicationAccepted => "application_accepted",
            NotificationKind::ApplicationRejected => "application_rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "friend_request" => Some(NotificationKind::FriendRequest),
            "friend_accepted" => Some(NotificationKind::FriendAccepted),
            "message" => Some(NotificationKind::Message),
            "application_accepted" => Some(NotificationKind::ApplicationAccepted),
            "application_rejected" => Some(NotificationKind::ApplicationRejected),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_pair_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(CanonicalPair::new(a, b), CanonicalPair::new(b, a));
    }

    #[test]
    fn canonical_pair_other_returns_counterpart() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let pair = CanonicalPair::new(a, b);
        assert_eq!(pair.other(a), b);
        assert_eq!(pair.other(b), a);
    }

    #[test]
    fn enum_round_trips() {
        for kind in [
            NotificationKind::FriendRequest,
            NotificationKind::FriendAccepted,
            NotificationKind::Message,
            NotificationKind::ApplicationAccepted,
            NotificationKind::ApplicationRejected,
        ] {
            assert_eq!(NotificationKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(NotificationKind::from_str("banana"), None);
        assert_eq!(FriendStatus::from_str("accepted"), Some(FriendStatus::Accepted));
        assert_eq!(ApplicationStatus::from_str("rejected"), Some(ApplicationStatus::Rejected));
    }
}
