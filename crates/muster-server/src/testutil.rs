//! Shared fixtures for service-level tests.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use muster_store::{Database, Duty};

use crate::applications::ApplicationLifecycle;
use crate::conversations::MessageLedger;
use crate::friends::RelationshipGraph;
use crate::notifications::NotificationHub;

/// A fully-wired service set over a throwaway database.
pub(crate) struct TestCtx {
    _dir: tempfile::TempDir,
    pub db: Arc<Mutex<Database>>,
    pub hub: NotificationHub,
    pub graph: RelationshipGraph,
    pub ledger: MessageLedger,
    pub lifecycle: ApplicationLifecycle,
}

impl TestCtx {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Mutex::new(
            Database::open_at(&dir.path().join("test.db")).unwrap(),
        ));
        let hub = NotificationHub::new(db.clone());
        Self {
            _dir: dir,
            graph: RelationshipGraph::new(db.clone(), hub.clone()),
            ledger: MessageLedger::new(db.clone(), hub.clone()),
            lifecycle: ApplicationLifecycle::new(db.clone(), hub.clone()),
            hub,
            db,
        }
    }

    /// Two fresh users with an accepted friendship.
    pub async fn befriend(&self) -> (Uuid, Uuid) {
        let a = Uuid::new_v4();
        self.befriend_with(a).await
    }

    /// Befriend `a` with a fresh user; returns `(a, new_friend)`.
    pub async fn befriend_with(&self, a: Uuid) -> (Uuid, Uuid) {
        let b = Uuid::new_v4();
        self.graph.request_or_accept(a, b).await.unwrap();
        self.graph.accept(b, a).await.unwrap();
        (a, b)
    }

    /// Insert a duty mirror row with a fresh creator.
    pub async fn seed_duty(&self, title: &str) -> Duty {
        let duty = Duty {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: None,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
        };
        let db = self.db.lock().await;
        db.upsert_duty(&duty).unwrap();
        duty
    }
}
