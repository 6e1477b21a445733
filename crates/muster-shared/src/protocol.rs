use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::NotificationKind;

/// Events delivered over the per-user push stream.
///
/// Each event is framed as `{ "type": ..., "payload": ... }` and is emitted
/// at most once per connection (deduplication is connection-scoped; the
/// `read` flags on messages and notifications cover reconnects).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum PushEvent {
    /// Sent once when the stream is established.
    Connected(ConnectedPayload),
    /// An unread message addressed to the connected user.
    NewMessage(MessageEvent),
    /// An unread notification for the connected user.
    NewNotification(NotificationEvent),
    /// A transient server-side error; the stream stays open.
    Error(ErrorPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedPayload {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub related_user: Option<Uuid>,
    pub related_duty: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged_by_type() {
        let event = PushEvent::Error(ErrorPayload {
            message: "store unavailable".into(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["payload"]["message"], "store unavailable");
    }

    #[test]
    fn connected_event_round_trips() {
        let event = PushEvent::Connected(ConnectedPayload {
            user_id: Uuid::new_v4(),
        });
        let json = serde_json::to_string(&event).unwrap();
        let back: PushEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, PushEvent::Connected(_)));
    }
}
