//! PushChannel: per-user SSE delivery of unread messages and notifications.
//!
//! Each open connection owns a polling loop over the store.  A
//! connection-local dedup set guarantees every item id is emitted at most
//! once per connection lifetime; correctness across reconnects comes from
//! the `read` flags, not from this set.  Messages are marked read at the
//! moment of emission.  Store errors surface as `error` events and the loop
//! keeps polling; dropping the response (client disconnect) cancels the
//! loop at its next await point and discards the dedup set.

use std::collections::{HashSet, VecDeque};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use muster_shared::protocol::{
    ConnectedPayload, ErrorPayload, MessageEvent, NotificationEvent, PushEvent,
};
use muster_store::{Database, StoreError};

/// Page size for the per-tick unread notification walk.
const PUSH_SCAN_LIMIT: u32 = 100;

#[derive(Clone)]
pub struct PushChannel {
    db: Arc<Mutex<Database>>,
    poll_interval: Duration,
}

impl PushChannel {
    pub fn new(db: Arc<Mutex<Database>>, poll_interval: Duration) -> Self {
        Self { db, poll_interval }
    }

    /// Build the SSE response for one user connection.
    pub fn stream_for(
        &self,
        user_id: Uuid,
    ) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
        debug!(user = %user_id, "push connection opened");

        let mut connection = Connection::new(self.db.clone(), user_id, self.poll_interval);
        connection
            .queue
            .push_back(PushEvent::Connected(ConnectedPayload { user_id }));

        let stream = stream::unfold(connection, |mut connection| async move {
            loop {
                if let Some(event) = connection.queue.pop_front() {
                    match Event::default().json_data(&event) {
                        Ok(sse_event) => return Some((Ok(sse_event), connection)),
                        Err(e) => {
                            warn!(error = %e, "failed to serialize push event; skipping");
                            continue;
                        }
                    }
                }

                connection.interval.tick().await;
                if let Err(e) = connection.poll_once().await {
                    warn!(
                        user = %connection.user_id,
                        error = %e,
                        "push poll failed; reporting and continuing"
                    );
                    connection.queue.push_back(PushEvent::Error(ErrorPayload {
                        message: "internal storage error".to_string(),
                    }));
                }
            }
        });

        Sse::new(stream).keep_alive(KeepAlive::default())
    }
}

/// State owned by one push connection.
struct Connection {
    db: Arc<Mutex<Database>>,
    user_id: Uuid,
    interval: tokio::time::Interval,
    /// Message ids already emitted on this connection.
    seen_messages: HashSet<Uuid>,
    /// Notification ids already emitted on this connection.
    seen_notifications: HashSet<Uuid>,
    queue: VecDeque<PushEvent>,
}

impl Connection {
    fn new(db: Arc<Mutex<Database>>, user_id: Uuid, poll_interval: Duration) -> Self {
        Self {
            db,
            user_id,
            interval: tokio::time::interval(poll_interval),
            seen_messages: HashSet::new(),
            seen_notifications: HashSet::new(),
            queue: VecDeque::new(),
        }
    }

    /// Scan the store once, queueing events for anything not yet emitted on
    /// this connection.
    async fn poll_once(&mut self) -> std::result::Result<(), StoreError> {
        let db = self.db.lock().await;
        let now = Utc::now();

        for message in db.list_unread_messages_for_user(self.user_id)? {
            if self.seen_messages.insert(message.id) {
                db.mark_message_read(message.id, now)?;
                self.queue.push_back(PushEvent::NewMessage(MessageEvent {
                    id: message.id,
                    conversation_id: message.conversation_id,
                    sender: message.sender,
                    content: message.content,
                    created_at: message.created_at,
                }));
            }
        }

        // Walk the entire unread backlog in keyset pages; notifications
        // stay unread on emission, so a fixed newest-first window would
        // starve anything older than one page.
        let mut cursor: Option<(DateTime<Utc>, Uuid)> = None;
        loop {
            let page =
                db.list_unread_notifications_after(self.user_id, cursor, PUSH_SCAN_LIMIT)?;
            let exhausted = (page.len() as u32) < PUSH_SCAN_LIMIT;
            for notification in page {
                cursor = Some((notification.created_at, notification.id));
                if self.seen_notifications.insert(notification.id) {
                    self.queue
                        .push_back(PushEvent::NewNotification(NotificationEvent {
                            id: notification.id,
                            kind: notification.kind,
                            title: notification.title,
                            body: notification.body,
                            related_user: notification.related_user,
                            related_duty: notification.related_duty,
                            created_at: notification.created_at,
                        }));
                }
            }
            if exhausted {
                break;
            }
        }

        Ok(())
    }
}
