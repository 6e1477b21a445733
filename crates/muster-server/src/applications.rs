//! ApplicationLifecycle and GroupFormation.
//!
//! Accepting a duty application idempotently creates or updates the duty's
//! group.  Group creation is the third create-or-fetch race in the system
//! (after friendships and conversations): two simultaneous acceptances for
//! the same duty both call `ensure_membership`, and the loser of the unique
//! `duty_id` index re-reads the winner's group.  The admin bulk path goes
//! through the same function so the two triggers cannot diverge.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use muster_shared::{ApplicationStatus, NotificationKind};
use muster_store::{Database, DutyApplication, Group, StoreError};

use crate::error::{ApiError, Result};
use crate::notifications::{NotificationHub, NotifyContext};

#[derive(Clone)]
pub struct ApplicationLifecycle {
    db: Arc<Mutex<Database>>,
    hub: NotificationHub,
}

impl ApplicationLifecycle {
    pub fn new(db: Arc<Mutex<Database>>, hub: NotificationHub) -> Self {
        Self { db, hub }
    }

    /// Apply to a duty.  At most one application per (duty, applicant).
    pub async fn apply(&self, user_id: Uuid, duty_id: Uuid) -> Result<DutyApplication> {
        let db = self.db.lock().await;

        match db.get_duty(duty_id) {
            Ok(_) => {}
            Err(StoreError::NotFound) => {
                return Err(ApiError::NotFound("Duty not found".into()))
            }
            Err(e) => return Err(e.into()),
        }

        if db.find_application(duty_id, user_id)?.is_some() {
            return Err(ApiError::Conflict("Already applied to this duty".into()));
        }

        let now = Utc::now();
        let application = DutyApplication {
            id: Uuid::new_v4(),
            duty_id,
            applicant: user_id,
            status: ApplicationStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        match db.insert_application(&application) {
            Ok(()) => {}
            // Concurrent double-apply: the unique index already holds a row.
            Err(e) if e.is_unique_violation() => {
                return Err(ApiError::Conflict("Already applied to this duty".into()))
            }
            Err(e) => return Err(e.into()),
        }

        info!(user = %user_id, duty = %duty_id, "application created");
        Ok(application)
    }

    /// Transition an application's status.
    ///
    /// Setting the current status again is an idempotent success with no
    /// side effects.  A transition into `accepted` folds the applicant into
    /// the duty's group; accepted/rejected transitions notify the applicant.
    pub async fn set_status(
        &self,
        application_id: Uuid,
        new_status: ApplicationStatus,
    ) -> Result<DutyApplication> {
        let (application, notify) = {
            let db = self.db.lock().await;
            let existing = match db.get_application(application_id) {
                Ok(a) => a,
                Err(StoreError::NotFound) => {
                    return Err(ApiError::NotFound("Application not found".into()))
                }
                Err(e) => return Err(e.into()),
            };

            if existing.status == new_status {
                return Ok(existing);
            }

            let now = Utc::now();
            db.set_application_status(application_id, new_status, now)?;
            let updated = DutyApplication {
                status: new_status,
                updated_at: now,
                ..existing
            };

            let notify = match new_status {
                ApplicationStatus::Accepted => {
                    ensure_membership_locked(&db, updated.duty_id, updated.applicant)?;
                    Some(NotificationKind::ApplicationAccepted)
                }
                ApplicationStatus::Rejected => Some(NotificationKind::ApplicationRejected),
                ApplicationStatus::Pending => None,
            };
            (updated, notify)
        };

        if let Some(kind) = notify {
            self.hub
                .emit(
                    application.applicant,
                    kind,
                    NotifyContext {
                        related_duty: Some(application.duty_id),
                        ..Default::default()
                    },
                )
                .await;
        }

        info!(
            application = %application.id,
            duty = %application.duty_id,
            status = new_status.as_str(),
            "application status changed"
        );
        Ok(application)
    }

    /// Fold a user into the duty's group, creating the group if absent.
    /// The admin bulk endpoint calls this directly.
    pub async fn ensure_membership(&self, duty_id: Uuid, user_id: Uuid) -> Result<Group> {
        let db = self.db.lock().await;
        ensure_membership_locked(&db, duty_id, user_id)
    }

    /// Remove a member from a group.
    ///
    /// Only the group's creator (or an admin) may do so.  If the removed
    /// user's application for the duty is currently accepted it reverts to
    /// pending; the reverse direction (re-adding a member) never promotes
    /// an application.
    pub async fn remove_member(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        actor: Uuid,
        actor_is_admin: bool,
    ) -> Result<()> {
        let db = self.db.lock().await;
        let group = match db.get_group(group_id) {
            Ok(g) => g,
            Err(StoreError::NotFound) => {
                return Err(ApiError::NotFound("Group not found".into()))
            }
            Err(e) => return Err(e.into()),
        };

        if actor != group.created_by && !actor_is_admin {
            return Err(ApiError::Forbidden(
                "Only the group creator can remove members".into(),
            ));
        }

        if !db.remove_group_member(group_id, user_id)? {
            return Err(ApiError::NotFound("User is not a group member".into()));
        }

        if let Some(application) = db.find_application(group.duty_id, user_id)? {
            if application.status == ApplicationStatus::Accepted {
                db.set_application_status(application.id, ApplicationStatus::Pending, Utc::now())?;
                debug!(
                    application = %application.id,
                    user = %user_id,
                    "application reverted to pending after group removal"
                );
            }
        }

        info!(group = %group_id, user = %user_id, actor = %actor, "group member removed");
        Ok(())
    }

    /// The group for a duty together with its member set.
    pub async fn group_for_duty(&self, duty_id: Uuid) -> Result<(Group, Vec<Uuid>)> {
        let db = self.db.lock().await;
        let group = db
            .find_group_for_duty(duty_id)?
            .ok_or_else(|| ApiError::NotFound("No group for this duty".into()))?;
        let members = db.list_group_members(group.id)?;
        Ok((group, members))
    }
}

/// Create-or-update the duty's group under an already-held lock.
///
/// On creation the member set is seeded with every applicant currently in
/// `accepted` status (the caller has already flipped the triggering
/// application, so it is included).  On an existing group the user is added
/// with set semantics.
fn ensure_membership_locked(db: &Database, duty_id: Uuid, user_id: Uuid) -> Result<Group> {
    loop {
        if let Some(group) = db.find_group_for_duty(duty_id)? {
            if db.add_group_member(group.id, user_id, Utc::now())? {
                debug!(group = %group.id, user = %user_id, "group member added");
            }
            return Ok(group);
        }

        let duty = match db.get_duty(duty_id) {
            Ok(d) => d,
            Err(StoreError::NotFound) => {
                return Err(ApiError::NotFound("Duty not found".into()))
            }
            Err(e) => return Err(e.into()),
        };

        let now = Utc::now();
        let group = Group {
            id: Uuid::new_v4(),
            duty_id,
            name: format!("{} Team", duty.title),
            description: Some(format!("Volunteer group for {}", duty.title)),
            created_by: duty.created_by,
            created_at: now,
        };
        match db.insert_group(&group) {
            Ok(()) => {
                // Seed with all currently accepted applicants plus the user
                // being folded in.
                db.add_group_member(group.id, user_id, now)?;
                for application in
                    db.list_applications_for_duty(duty_id, Some(ApplicationStatus::Accepted))?
                {
                    db.add_group_member(group.id, application.applicant, now)?;
                }
                info!(group = %group.id, duty = %duty_id, "group created");
                return Ok(group);
            }
            // Lost the creation race: loop back and join the winner.
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
    async fn apply_requires_existing_duty() {
        let ctx = TestCtx::new();
        let err = ctx
            .lifecycle
            .apply(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn double_apply_conflicts() {
        let ctx = TestCtx::new();
        let duty = ctx.seed_duty("Beach cleanup").await;
        let user = Uuid::new_v4();

        let application = ctx.lifecycle.apply(user, duty.id).await.unwrap();
        assert_eq!(application.status, ApplicationStatus::Pending);

        let err = ctx.lifecycle.apply(user, duty.id).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn accept_creates_group_and_notifies() {
        let ctx = TestCtx::new();
        let duty = ctx.seed_duty("Beach cleanup").await;
        let u = Uuid::new_v4();

        let application = ctx.lifecycle.apply(u, duty.id).await.unwrap();
        let updated = ctx
            .lifecycle
            .set_status(application.id, ApplicationStatus::Accepted)
            .await
            .unwrap();
        assert_eq!(updated.status, ApplicationStatus::Accepted);

        let (group, members) = ctx.lifecycle.group_for_duty(duty.id).await.unwrap();
        assert_eq!(group.name, "Beach cleanup Team");
        assert_eq!(group.created_by, duty.created_by);
        assert_eq!(members, vec![u]);

        let (notifications, _) = ctx.hub.list(u, true, 50).await.unwrap();
        assert!(notifications
            .iter()
            .any(|n| n.kind == NotificationKind::ApplicationAccepted));
    }

    #[tokio::test]
    async fn second_acceptance_joins_existing_group() {
        let ctx = TestCtx::new();
        let duty = ctx.seed_duty("Beach cleanup").await;
        let u = Uuid::new_v4();
        let v = Uuid::new_v4();

        let app_u = ctx.lifecycle.apply(u, duty.id).await.unwrap();
        let app_v = ctx.lifecycle.apply(v, duty.id).await.unwrap();

        ctx.lifecycle
            .set_status(app_u.id, ApplicationStatus::Accepted)
            .await
            .unwrap();
        let (first_group, _) = ctx.lifecycle.group_for_duty(duty.id).await.unwrap();

        ctx.lifecycle
            .set_status(app_v.id, ApplicationStatus::Accepted)
            .await
            .unwrap();
        let (group, members) = ctx.lifecycle.group_for_duty(duty.id).await.unwrap();

        // Same group, no duplicated members.
        assert_eq!(group.id, first_group.id);
        assert_eq!(members.len(), 2);
        assert!(members.contains(&u));
        assert!(members.contains(&v));
    }

    #[tokio::test]
    async fn same_status_transition_is_idempotent() {
        let ctx = TestCtx::new();
        let duty = ctx.seed_duty("Beach cleanup").await;
        let u = Uuid::new_v4();

        let application = ctx.lifecycle.apply(u, duty.id).await.unwrap();
        ctx.lifecycle
            .set_status(application.id, ApplicationStatus::Accepted)
            .await
            .unwrap();
        ctx.lifecycle
            .set_status(application.id, ApplicationStatus::Accepted)
            .await
            .unwrap();

        let (_, members) = ctx.lifecycle.group_for_duty(duty.id).await.unwrap();
        assert_eq!(members, vec![u]);

        // Only one acceptance notification was emitted.
        let (notifications, _) = ctx.hub.list(u, false, 50).await.unwrap();
        let accepted: Vec<_> = notifications
            .iter()
            .filter(|n| n.kind == NotificationKind::ApplicationAccepted)
            .collect();
        assert_eq!(accepted.len(), 1);
    }

    #[tokio::test]
    async fn rejection_notifies_without_group() {
        let ctx = TestCtx::new();
        let duty = ctx.seed_duty("Beach cleanup").await;
        let u = Uuid::new_v4();

        let application = ctx.lifecycle.apply(u, duty.id).await.unwrap();
        ctx.lifecycle
            .set_status(application.id, ApplicationStatus::Rejected)
            .await
            .unwrap();

        let err = ctx.lifecycle.group_for_duty(duty.id).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        let (notifications, _) = ctx.hub.list(u, true, 50).await.unwrap();
        assert!(notifications
            .iter()
            .any(|n| n.kind == NotificationKind::ApplicationRejected));
    }

    #[tokio::test]
    async fn group_creation_seeds_previously_accepted_applicants() {
        let ctx = TestCtx::new();
        let duty = ctx.seed_duty("Beach cleanup").await;
        let u = Uuid::new_v4();
        let v = Uuid::new_v4();

        // u was accepted before any group existed (e.g. data predating
        // group formation); folding v in via the bulk path seeds u too.
        let app_u = ctx.lifecycle.apply(u, duty.id).await.unwrap();
        {
            let db = ctx.db.lock().await;
            db.set_application_status(app_u.id, ApplicationStatus::Accepted, Utc::now())
                .unwrap();
        }

        ctx.lifecycle.ensure_membership(duty.id, v).await.unwrap();

        let (_, members) = ctx.lifecycle.group_for_duty(duty.id).await.unwrap();
        assert_eq!(members.len(), 2);
        assert!(members.contains(&u));
        assert!(members.contains(&v));
    }

    #[tokio::test]
    async fn bulk_ensure_membership_is_idempotent() {
        let ctx = TestCtx::new();
        let duty = ctx.seed_duty("Beach cleanup").await;
        let u = Uuid::new_v4();

        let g1 = ctx.lifecycle.ensure_membership(duty.id, u).await.unwrap();
        let g2 = ctx.lifecycle.ensure_membership(duty.id, u).await.unwrap();
        assert_eq!(g1.id, g2.id);

        let (_, members) = ctx.lifecycle.group_for_duty(duty.id).await.unwrap();
        assert_eq!(members, vec![u]);
    }

    #[tokio::test]
    async fn removal_demotes_accepted_application() {
        let ctx = TestCtx::new();
        let duty = ctx.seed_duty("Beach cleanup").await;
        let u = Uuid::new_v4();

        let application = ctx.lifecycle.apply(u, duty.id).await.unwrap();
        ctx.lifecycle
            .set_status(application.id, ApplicationStatus::Accepted)
            .await
            .unwrap();
        let (group, _) = ctx.lifecycle.group_for_duty(duty.id).await.unwrap();

        // A random actor may not remove members.
        let err = ctx
            .lifecycle
            .remove_member(group.id, u, Uuid::new_v4(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        // The creator can; the application reverts to pending.
        ctx.lifecycle
            .remove_member(group.id, u, duty.created_by, false)
            .await
            .unwrap();

        let (_, members) = ctx.lifecycle.group_for_duty(duty.id).await.unwrap();
        assert!(members.is_empty());

        let db = ctx.db.lock().await;
        let application = db.get_application(application.id).unwrap();
        assert_eq!(application.status, ApplicationStatus::Pending);
    }

    #[tokio::test]
    async fn readding_member_never_promotes_application() {
        let ctx = TestCtx::new();
        let duty = ctx.seed_duty("Beach cleanup").await;
        let u = Uuid::new_v4();

        let application = ctx.lifecycle.apply(u, duty.id).await.unwrap();
        ctx.lifecycle
            .set_status(application.id, ApplicationStatus::Accepted)
            .await
            .unwrap();
        let (group, _) = ctx.lifecycle.group_for_duty(duty.id).await.unwrap();

        ctx.lifecycle
            .remove_member(group.id, u, duty.created_by, false)
            .await
            .unwrap();
        // Re-adding via the bulk path restores membership only.
        ctx.lifecycle.ensure_membership(duty.id, u).await.unwrap();

        let db = ctx.db.lock().await;
        let application = db.get_application(application.id).unwrap();
        assert_eq!(application.status, ApplicationStatus::Pending);
    }
}
