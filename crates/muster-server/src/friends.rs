//! RelationshipGraph: the friend/follow state machine between user pairs.
//!
//! The edge is undirected (at most one record per unordered pair, in
//! canonical order) but keeps `initiated_by` so the pending direction is
//! known.  Two users following each other for the first time concurrently
//! race on the pair's unique index; the loser re-reads the winner's record
//! and continues through the normal state machine instead of failing.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use muster_shared::{CanonicalPair, FriendStatus, FriendStatusView, NotificationKind};
use muster_store::{Database, Friendship};

use crate::error::{ApiError, Result};
use crate::notifications::{NotificationHub, NotifyContext};

/// Outcome of [`RelationshipGraph::request_or_accept`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    /// A new pending request was created.
    Requested,
    /// A pending request from the counterparty was accepted.
    Accepted,
}

#[derive(Clone)]
pub struct RelationshipGraph {
    db: Arc<Mutex<Database>>,
    hub: NotificationHub,
}

impl RelationshipGraph {
    pub fn new(db: Arc<Mutex<Database>>, hub: NotificationHub) -> Self {
        Self { db, hub }
    }

    /// Follow a user: create a pending request, or accept the counterpart's
    /// pending request if one exists.
    pub async fn request_or_accept(
        &self,
        requester: Uuid,
        recipient: Uuid,
    ) -> Result<(Friendship, FollowOutcome)> {
        if requester == recipient {
            return Err(ApiError::Validation(
                "Cannot send a friend request to yourself".into(),
            ));
        }

        let pair = CanonicalPair::new(requester, recipient);

        // (friendship, outcome, notification target or None)
        let (friendship, outcome, notify) = {
            let db = self.db.lock().await;
            loop {
                match db.find_friendship(pair)? {
                    Some(existing) => match existing.status {
                        FriendStatus::Accepted => {
                            return Err(ApiError::Conflict("Already friends".into()))
                        }
                        FriendStatus::Pending if existing.initiated_by == requester => {
                            return Err(ApiError::Conflict(
                                "Friend request already sent".into(),
                            ))
                        }
                        FriendStatus::Pending => {
                            // The counterparty asked first: this follow is
                            // an acceptance.
                            let now = Utc::now();
                            db.set_friendship_status(existing.id, FriendStatus::Accepted, now)?;
                            let updated = Friendship {
                                status: FriendStatus::Accepted,
                                updated_at: now,
                                ..existing
                            };
                            break (
                                updated,
                                FollowOutcome::Accepted,
                                Some((existing.initiated_by, NotificationKind::FriendAccepted)),
                            );
                        }
                    },
                    None => {
                        let now = Utc::now();
                        let fresh = Friendship {
                            id: Uuid::new_v4(),
                            user_low: pair.low,
                            user_high: pair.high,
                            initiated_by: requester,
                            status: FriendStatus::Pending,
                            created_at: now,
                            updated_at: now,
                        };
                        match db.insert_friendship(&fresh) {
                            Ok(()) => {
                                break (
                                    fresh,
                                    FollowOutcome::Requested,
                                    Some((recipient, NotificationKind::FriendRequest)),
                                )
                            }
                            // Lost a first-contact race: re-read and run
                            // the state machine against the winner.
                            Err(e) if e.is_unique_violation() => continue,
                            Err(e) => return Err(e.into()),
                        }
                    }
                }
            }
        };

        if let Some((target, kind)) = notify {
            let actor = pair.other(target);
            self.hub
                .emit(
                    target,
                    kind,
                    NotifyContext {
                        related_user: Some(actor),
                        related_friendship: Some(friendship.id),
                        ..Default::default()
                    },
                )
                .await;
        }

        info!(
            requester = %requester,
            recipient = %recipient,
            outcome = ?outcome,
            "follow processed"
        );
        Ok((friendship, outcome))
    }

    /// Accept the pending request sent to `user_id` by `counterparty`.
    pub async fn accept(&self, user_id: Uuid, counterparty: Uuid) -> Result<Friendship> {
        let pair = CanonicalPair::new(user_id, counterparty);

        let friendship = {
            let db = self.db.lock().await;
            let existing = db
                .find_friendship(pair)?
                .filter(|f| f.status == FriendStatus::Pending)
                .ok_or_else(|| ApiError::NotFound("No pending friend request".into()))?;

            if existing.initiated_by == user_id {
                return Err(ApiError::Forbidden(
                    "Only the recipient can accept a friend request".into(),
                ));
            }

            let now = Utc::now();
            db.set_friendship_status(existing.id, FriendStatus::Accepted, now)?;
            Friendship {
                status: FriendStatus::Accepted,
                updated_at: now,
                ..existing
            }
        };

        self.hub
            .emit(
                friendship.initiated_by,
                NotificationKind::FriendAccepted,
                NotifyContext {
                    related_user: Some(user_id),
                    related_friendship: Some(friendship.id),
                    ..Default::default()
                },
            )
            .await;

        info!(user = %user_id, counterparty = %counterparty, "friend request accepted");
        Ok(friendship)
    }

    /// Remove the edge (pending or accepted) between two users.
    /// No notification is emitted.
    pub async fn unfollow(&self, user_id: Uuid, counterparty: Uuid) -> Result<()> {
        let pair = CanonicalPair::new(user_id, counterparty);
        let db = self.db.lock().await;
        if !db.delete_friendship(pair)? {
            return Err(ApiError::NotFound("No relationship to remove".into()));
        }
        info!(user = %user_id, counterparty = %counterparty, "unfollowed");
        Ok(())
    }

    /// Relationship status from `user_id`'s point of view.
    pub async fn status_for(&self, user_id: Uuid, other: Uuid) -> Result<Option<FriendStatusView>> {
        let pair = CanonicalPair::new(user_id, other);
        let db = self.db.lock().await;
        let view = db.find_friendship(pair)?.map(|f| match f.status {
            FriendStatus::Accepted => FriendStatusView::Accepted,
            FriendStatus::Pending if f.initiated_by == user_id => FriendStatusView::PendingSent,
            FriendStatus::Pending => FriendStatusView::PendingReceived,
        });
        Ok(view)
    }

    /// Counterpart ids of all accepted edges touching `user_id`.
    pub async fn list_accepted(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let db = self.db.lock().await;
        let friends = db
            .list_accepted_friendships(user_id)?
            .into_iter()
            .map(|f| f.pair().other(user_id))
            .collect();
        Ok(friends)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn graph() -> (tempfile::TempDir, RelationshipGraph) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Mutex::new(
            Database::open_at(&dir.path().join("test.db")).unwrap(),
        ));
        let hub = NotificationHub::new(db.clone());
        (dir, RelationshipGraph::new(db, hub))
    }

    #[tokio::test]
    async fn self_follow_is_rejected() {
        let (_dir, graph) = graph();
        let me = Uuid::new_v4();
        let err = graph.request_or_accept(me, me).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn repeat_request_conflicts() {
        let (_dir, graph) = graph();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let (_, outcome) = graph.request_or_accept(a, b).await.unwrap();
        assert_eq!(outcome, FollowOutcome::Requested);

        let err = graph.request_or_accept(a, b).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn counter_follow_accepts() {
        let (_dir, graph) = graph();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        graph.request_or_accept(a, b).await.unwrap();
        let (friendship, outcome) = graph.request_or_accept(b, a).await.unwrap();
        assert_eq!(outcome, FollowOutcome::Accepted);
        assert_eq!(friendship.status, FriendStatus::Accepted);

        // Symmetric views.
        assert_eq!(
            graph.status_for(a, b).await.unwrap(),
            Some(FriendStatusView::Accepted)
        );
        assert_eq!(
            graph.status_for(b, a).await.unwrap(),
            Some(FriendStatusView::Accepted)
        );

        // Following again now conflicts.
        let err = graph.request_or_accept(a, b).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn accept_is_recipient_only() {
        let (_dir, graph) = graph();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        graph.request_or_accept(a, b).await.unwrap();

        // The requester cannot accept their own request.
        let err = graph.accept(a, b).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        let friendship = graph.accept(b, a).await.unwrap();
        assert_eq!(friendship.status, FriendStatus::Accepted);

        // A friend_accepted notification lands at the original requester.
        let hub = NotificationHub::new(graph.db.clone());
        let (notifications, _) = hub.list(a, true, 50).await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, NotificationKind::FriendAccepted);
    }

    #[tokio::test]
    async fn accept_without_request_is_not_found() {
        let (_dir, graph) = graph();
        let err = graph
            .accept(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn pending_views_are_directional() {
        let (_dir, graph) = graph();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        graph.request_or_accept(a, b).await.unwrap();
        assert_eq!(
            graph.status_for(a, b).await.unwrap(),
            Some(FriendStatusView::PendingSent)
        );
        assert_eq!(
            graph.status_for(b, a).await.unwrap(),
            Some(FriendStatusView::PendingReceived)
        );
    }

    #[tokio::test]
    async fn unfollow_clears_edge_either_way() {
        let (_dir, graph) = graph();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        graph.request_or_accept(a, b).await.unwrap();
        graph.accept(b, a).await.unwrap();

        // Either party can unfollow.
        graph.unfollow(b, a).await.unwrap();
        assert_eq!(graph.status_for(a, b).await.unwrap(), None);

        let err = graph.unfollow(a, b).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_accepted_resolves_counterparts() {
        let (_dir, graph) = graph();
        let me = Uuid::new_v4();
        let friend = Uuid::new_v4();
        let pending = Uuid::new_v4();

        graph.request_or_accept(me, friend).await.unwrap();
        graph.accept(friend, me).await.unwrap();
        graph.request_or_accept(me, pending).await.unwrap();

        assert_eq!(graph.list_accepted(me).await.unwrap(), vec![friend]);
        assert_eq!(graph.list_accepted(friend).await.unwrap(), vec![me]);
    }
}
