//! ConversationRegistry and MessageLedger.
//!
//! A conversation is the single, deduplicated channel between two accepted
//! friends.  `resolve` is an idempotent upsert: concurrent first-message
//! sends between the same pair race on the pair's unique index, and the
//! loser re-reads the winner's row.  Callers never observe two
//! conversations for one pair and never see the race as an error.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use muster_shared::{CanonicalPair, FriendStatus, NotificationKind};
use muster_store::{Conversation, ConversationSummary, Database, Message};

use crate::error::{ApiError, Result};
use crate::notifications::{NotificationHub, NotifyContext};

#[derive(Clone)]
pub struct MessageLedger {
    db: Arc<Mutex<Database>>,
    hub: NotificationHub,
}

impl MessageLedger {
    pub fn new(db: Arc<Mutex<Database>>, hub: NotificationHub) -> Self {
        Self { db, hub }
    }

    /// Return the conversation for a user pair, creating it if absent.
    ///
    /// Requires an accepted friendship between the two users.
    pub async fn resolve(&self, a: Uuid, b: Uuid) -> Result<Conversation> {
        let db = self.db.lock().await;
        resolve_locked(&db, a, b)
    }

    /// Send a message from `sender` to `recipient`.
    ///
    /// Resolves (or lazily creates) the conversation, appends the message
    /// unread, and bumps the conversation summary.  A `message` notification
    /// is emitted to the recipient best-effort.
    pub async fn send(&self, sender: Uuid, recipient: Uuid, content: &str) -> Result<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ApiError::Validation("Message content is required".into()));
        }

        let message = {
            let db = self.db.lock().await;
            let conversation = resolve_locked(&db, sender, recipient)?;

            let now = Utc::now();
            let message = Message {
                id: Uuid::new_v4(),
                conversation_id: conversation.id,
                sender,
                content: content.to_string(),
                read: false,
                read_at: None,
                created_at: now,
            };
            db.insert_message(&message)?;
            // The summary update is a second write; a crash in between
            // leaves it stale, which heals on the next send.
            db.set_conversation_last_message(conversation.id, message.id, now)?;
            message
        };

        self.hub
            .emit(
                recipient,
                NotificationKind::Message,
                NotifyContext {
                    related_user: Some(sender),
                    ..Default::default()
                },
            )
            .await;

        info!(
            sender = %sender,
            recipient = %recipient,
            conversation = %message.conversation_id,
            "message sent"
        );
        Ok(message)
    }

    /// All conversations touching a user, annotated with the counterpart,
    /// last message, and unread count; most recently active first.
    pub async fn list_conversations(&self, user_id: Uuid) -> Result<Vec<ConversationSummary>> {
        let db = self.db.lock().await;
        Ok(db.list_conversation_summaries(user_id)?)
    }

    /// All messages of a conversation in creation order.
    ///
    /// Viewing marks as read: every message authored by the counterpart and
    /// not yet read is flipped before the list is returned.
    pub async fn list_messages(&self, user_id: Uuid, conversation_id: Uuid) -> Result<Vec<Message>> {
        let db = self.db.lock().await;
        let conversation = match db.get_conversation(conversation_id) {
            Ok(c) => c,
            Err(muster_store::StoreError::NotFound) => {
                return Err(ApiError::NotFound("Conversation not found".into()))
            }
            Err(e) => return Err(e.into()),
        };
        if !conversation.pair().contains(user_id) {
            return Err(ApiError::Forbidden(
                "Not a participant of this conversation".into(),
            ));
        }

        let marked = db.mark_conversation_read(conversation_id, user_id, Utc::now())?;
        if marked > 0 {
            debug!(
                conversation = %conversation_id,
                reader = %user_id,
                marked,
                "messages marked read on view"
            );
        }

        Ok(db.list_messages_for_conversation(conversation_id)?)
    }
}

/// Create-or-fetch the conversation for a pair under an already-held lock.
fn resolve_locked(db: &Database, a: Uuid, b: Uuid) -> Result<Conversation> {
    let pair = CanonicalPair::new(a, b);

    let friends = db
        .find_friendship(pair)?
        .map(|f| f.status == FriendStatus::Accepted)
        .unwrap_or(false);
    if !friends {
        return Err(ApiError::NotFriends);
    }

    loop {
        if let Some(existing) = db.find_conversation_for_pair(pair)? {
            return Ok(existing);
        }

        let now = Utc::now();
        let fresh = Conversation {
            id: Uuid::new_v4(),
            user_low: pair.low,
            user_high: pair.high,
            last_message_id: None,
            last_message_at: None,
            created_at: now,
            updated_at: now,
        };
        match db.insert_conversation(&fresh) {
            Ok(()) => {
                debug!(conversation = %fresh.id, "conversation created");
                return Ok(fresh);
            }
            // Lost the creation race: loop back and return the winner.
            Err(e) if e.is_unique_violation() => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TestCtx;

    #[tokio::test]
    async fn resolve_requires_friendship() {
        let ctx = TestCtx::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let err = ctx.ledger.resolve(a, b).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFriends));

        // A pending request is not enough.
        ctx.graph.request_or_accept(a, b).await.unwrap();
        let err = ctx.ledger.resolve(a, b).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFriends));
    }

    #[tokio::test]
    async fn resolve_is_idempotent_and_order_independent() {
        let ctx = TestCtx::new();
        let (a, b) = ctx.befriend().await;

        let first = ctx.ledger.resolve(a, b).await.unwrap();
        let second = ctx.ledger.resolve(b, a).await.unwrap();
        let third = ctx.ledger.resolve(a, b).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.id, third.id);
    }

    #[tokio::test]
    async fn empty_content_is_rejected() {
        let ctx = TestCtx::new();
        let (a, b) = ctx.befriend().await;

        let err = ctx.ledger.send(a, b, "   ").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn send_then_list_round_trip() {
        let ctx = TestCtx::new();
        let (a, b) = ctx.befriend().await;

        let message = ctx.ledger.send(a, b, "hello").await.unwrap();

        // The recipient's inbox shows the message and one unread.
        let summaries = ctx.ledger.list_conversations(b).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].other_user, a);
        assert_eq!(summaries[0].unread_count, 1);
        assert_eq!(
            summaries[0].last_message.as_ref().unwrap().id,
            message.id
        );

        // Viewing marks as read and resets the unread count.
        let messages = ctx
            .ledger
            .list_messages(b, message.conversation_id)
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].read);
        assert!(messages[0].read_at.is_some());

        let summaries = ctx.ledger.list_conversations(b).await.unwrap();
        assert_eq!(summaries[0].unread_count, 0);

        // The sender's own view never counted it as unread.
        let summaries = ctx.ledger.list_conversations(a).await.unwrap();
        assert_eq!(summaries[0].unread_count, 0);
    }

    #[tokio::test]
    async fn list_messages_is_participant_only() {
        let ctx = TestCtx::new();
        let (a, b) = ctx.befriend().await;
        let message = ctx.ledger.send(a, b, "hi").await.unwrap();

        let stranger = Uuid::new_v4();
        let err = ctx
            .ledger
            .list_messages(stranger, message.conversation_id)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        let err = ctx
            .ledger
            .list_messages(a, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn messages_are_ordered_and_conversations_by_activity() {
        let ctx = TestCtx::new();
        let (a, b) = ctx.befriend().await;
        let (a2, c) = ctx.befriend_with(a).await;
        assert_eq!(a, a2);

        ctx.ledger.send(a, b, "one").await.unwrap();
        ctx.ledger.send(b, a, "two").await.unwrap();
        let last = ctx.ledger.send(a, c, "three").await.unwrap();

        let conversation = ctx.ledger.resolve(a, b).await.unwrap();
        let contents: Vec<String> = ctx
            .ledger
            .list_messages(a, conversation.id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["one", "two"]);

        // Most recently active conversation first.
        let summaries = ctx.ledger.list_conversations(a).await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].conversation.id, last.conversation_id);
    }

    #[tokio::test]
    async fn send_emits_message_notification() {
        let ctx = TestCtx::new();
        let (a, b) = ctx.befriend().await;

        ctx.ledger.send(a, b, "ping").await.unwrap();

        let (notifications, _) = ctx.hub.list(b, true, 50).await.unwrap();
        assert!(notifications
            .iter()
            .any(|n| n.kind == NotificationKind::Message));
    }
}
