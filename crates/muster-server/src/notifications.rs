//! NotificationHub: typed notification creation and read-state CRUD.
//!
//! Notifications are a side effect of the relationship and application
//! state machines.  Emission is best-effort: a failure to persist a
//! notification is logged and swallowed so it can never fail the action
//! that triggered it.  Unknown kind strings are dropped at the parsing
//! boundary ([`NotificationKind::from_str`] returns `None`), which makes
//! them a no-op rather than an error.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use muster_shared::NotificationKind;
use muster_store::{Database, Notification};

use crate::error::{ApiError, Result};

/// Entities a notification may point back to.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifyContext {
    pub related_user: Option<Uuid>,
    pub related_duty: Option<Uuid>,
    pub related_friendship: Option<Uuid>,
}

/// Creates and manages typed notifications.
#[derive(Clone)]
pub struct NotificationHub {
    db: Arc<Mutex<Database>>,
}

impl NotificationHub {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    /// Emit a notification to `user_id`, rendering the fixed template for
    /// `kind`.  Never fails: errors are logged and swallowed.
    pub async fn emit(&self, user_id: Uuid, kind: NotificationKind, ctx: NotifyContext) {
        if let Err(e) = self.try_emit(user_id, kind, ctx).await {
            warn!(
                user = %user_id,
                kind = kind.as_str(),
                error = %e,
                "notification emission failed; continuing"
            );
        }
    }

    async fn try_emit(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        ctx: NotifyContext,
    ) -> Result<Notification> {
        let db = self.db.lock().await;

        let (title, body) = render_template(&db, kind, ctx)?;

        let notification = Notification {
            id: Uuid::new_v4(),
            user_id,
            kind,
            title,
            body,
            related_user: ctx.related_user,
            related_duty: ctx.related_duty,
            related_friendship: ctx.related_friendship,
            read: false,
            read_at: None,
            created_at: Utc::now(),
        };
        db.insert_notification(&notification)?;

        debug!(user = %user_id, kind = kind.as_str(), "notification emitted");
        Ok(notification)
    }

    /// List a user's notifications plus their unread count.
    pub async fn list(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: u32,
    ) -> Result<(Vec<Notification>, u32)> {
        let db = self.db.lock().await;
        let notifications = db.list_notifications(user_id, unread_only, limit)?;
        let unread_count = db.count_unread_notifications(user_id)?;
        Ok((notifications, unread_count))
    }

    /// Mark one notification read.  Only the owner may do so.
    pub async fn mark_read(&self, user_id: Uuid, id: Uuid) -> Result<()> {
        let db = self.db.lock().await;
        let notification = owned_notification(&db, id, user_id)?;
        db.mark_notification_read(notification.id, Utc::now())?;
        Ok(())
    }

    /// Mark all of a user's notifications read.  Returns the number marked.
    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<usize> {
        let db = self.db.lock().await;
        Ok(db.mark_all_notifications_read(user_id, Utc::now())?)
    }

    /// Delete a notification.  Only the owner may do so.
    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<()> {
        let db = self.db.lock().await;
        let notification = owned_notification(&db, id, user_id)?;
        db.delete_notification(notification.id)?;
        Ok(())
    }
}

/// Fetch a notification and verify ownership.
fn owned_notification(db: &Database, id: Uuid, user_id: Uuid) -> Result<Notification> {
    let notification = match db.get_notification(id) {
        Ok(n) => n,
        Err(muster_store::StoreError::NotFound) => {
            return Err(ApiError::NotFound("Notification not found".into()))
        }
        Err(e) => return Err(e.into()),
    };
    if notification.user_id != user_id {
        return Err(ApiError::Forbidden(
            "Notification belongs to another user".into(),
        ));
    }
    Ok(notification)
}

/// Render the fixed title/body template for a notification kind.
///
/// Actor names come from the user mirror and fall back to the raw id when
/// the row is missing.  Duty titles have no sensible fallback; a missing
/// duty row fails the render, which `emit` swallows.
fn render_template(
    db: &Database,
    kind: NotificationKind,
    ctx: NotifyContext,
) -> Result<(String, String)> {
    let actor_name = match ctx.related_user {
        Some(user) => db.display_name_for(user)?,
        None => "Someone".to_string(),
    };

    let rendered = match kind {
        NotificationKind::FriendRequest => (
            "New Friend Request".to_string(),
            format!("{actor_name} wants to be your friend"),
        ),
        NotificationKind::FriendAccepted => (
            "Friend Request Accepted".to_string(),
            format!("{actor_name} accepted your friend request"),
        ),
        NotificationKind::Message => (
            "New Message".to_string(),
            format!("{actor_name} sent you a message"),
        ),
        NotificationKind::ApplicationAccepted | NotificationKind::ApplicationRejected => {
            let duty_title = match ctx.related_duty {
                Some(duty_id) => db.get_duty(duty_id)?.title,
                None => "a duty".to_string(),
            };
            if kind == NotificationKind::ApplicationAccepted {
                (
                    "Application Accepted".to_string(),
                    format!("Your application for {duty_title} has been accepted"),
                )
            } else {
                (
                    "Application Rejected".to_string(),
                    format!("Your application for {duty_title} has been rejected"),
                )
            }
        }
    };
    Ok(rendered)
}
