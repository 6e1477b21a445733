use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use muster_shared::{ApplicationStatus, FriendStatusView};
use muster_store::{
    ConversationSummary, Database, Duty, DutyApplication, Friendship, Group, Message,
    Notification, UserRef,
};

use crate::applications::ApplicationLifecycle;
use crate::config::ServerConfig;
use crate::conversations::MessageLedger;
use crate::error::ApiError;
use crate::friends::{FollowOutcome, RelationshipGraph};
use crate::notifications::NotificationHub;
use crate::push::PushChannel;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub graph: RelationshipGraph,
    pub ledger: MessageLedger,
    pub hub: NotificationHub,
    pub lifecycle: ApplicationLifecycle,
    pub push: PushChannel,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(db: Arc<Mutex<Database>>, config: Arc<ServerConfig>) -> Self {
        let hub = NotificationHub::new(db.clone());
        Self {
            graph: RelationshipGraph::new(db.clone(), hub.clone()),
            ledger: MessageLedger::new(db.clone(), hub.clone()),
            lifecycle: ApplicationLifecycle::new(db.clone(), hub.clone()),
            push: PushChannel::new(db.clone(), config.push_poll_interval),
            hub,
            db,
            config,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        // Friends
        .route("/friends", get(list_friends))
        .route("/friends/requests", post(follow))
        .route("/friends/requests/accept", post(accept_request))
        .route("/friends/status/:user_id", get(friend_status))
        .route("/friends/:user_id", delete(unfollow))
        // Messaging
        .route("/messages", post(send_message))
        .route("/conversations", get(list_conversations))
        .route("/conversations/:id/messages", get(list_messages))
        // Notifications
        .route("/notifications", get(list_notifications))
        .route("/notifications/read-all", post(mark_all_notifications_read))
        .route("/notifications/:id/read", post(mark_notification_read))
        .route("/notifications/:id", delete(delete_notification))
        // Applications and groups
        .route("/duties/:duty_id/applications", post(apply_to_duty))
        .route("/applications/:id/status", post(set_application_status))
        .route("/duties/:duty_id/group/members", post(add_group_member))
        .route("/groups/:duty_id", get(get_group))
        .route("/groups/:group_id/members/:user_id", delete(remove_group_member))
        // Push stream
        .route("/push", get(push_stream))
        // Admin mirrors of the externally-owned collections
        .route("/admin/users", post(admin_upsert_user))
        .route("/admin/duties", post(admin_upsert_duty))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Caller identity and admin token
// ---------------------------------------------------------------------------

/// Extract the caller's user id from the `x-user-id` header.
///
/// Authentication itself lives in front of this service; the session layer
/// injects the verified id.
fn caller_id(headers: &HeaderMap) -> Result<Uuid, ApiError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .ok_or_else(|| ApiError::Validation("Missing or invalid x-user-id header".into()))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let auth = headers.get("authorization")?.to_str().ok()?;
    Some(auth.strip_prefix("Bearer ").unwrap_or(auth))
}

/// Whether the request carries the configured admin token.
fn is_admin(headers: &HeaderMap, config: &ServerConfig) -> bool {
    match (&config.admin_token, bearer_token(headers)) {
        (Some(expected), Some(token)) => token == expected,
        _ => false,
    }
}

fn require_admin(headers: &HeaderMap, config: &ServerConfig) -> Result<(), ApiError> {
    if config.admin_token.is_none() {
        return Err(ApiError::Forbidden(
            "Admin API is disabled (no ADMIN_TOKEN configured)".into(),
        ));
    }
    if !is_admin(headers, config) {
        return Err(ApiError::Forbidden("Invalid admin token".into()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ServerInfoResponse {
    name: String,
    version: &'static str,
}

#[derive(Serialize)]
struct AckResponse {
    success: bool,
    message: String,
}

#[derive(Deserialize)]
struct FollowRequest {
    recipient_id: Uuid,
}

#[derive(Deserialize)]
struct AcceptRequest {
    user_id: Uuid,
}

#[derive(Serialize)]
struct FriendshipResponse {
    success: bool,
    message: String,
    friendship: Friendship,
}

#[derive(Serialize)]
struct FriendsResponse {
    success: bool,
    friends: Vec<Uuid>,
}

#[derive(Serialize)]
struct FriendStatusResponse {
    success: bool,
    status: Option<FriendStatusView>,
}

#[derive(Deserialize)]
struct SendMessageRequest {
    recipient_id: Uuid,
    content: String,
}

#[derive(Serialize)]
struct SendMessageResponse {
    success: bool,
    message: Message,
}

#[derive(Serialize)]
struct ConversationsResponse {
    success: bool,
    conversations: Vec<ConversationSummary>,
}

#[derive(Serialize)]
struct MessagesResponse {
    success: bool,
    messages: Vec<Message>,
}

#[derive(Deserialize)]
struct NotificationsQuery {
    #[serde(default)]
    unread_only: bool,
    limit: Option<u32>,
}

#[derive(Serialize)]
struct NotificationsResponse {
    success: bool,
    notifications: Vec<Notification>,
    unread_count: u32,
}

#[derive(Serialize)]
struct ApplicationResponse {
    success: bool,
    message: String,
    application: DutyApplication,
}

#[derive(Deserialize)]
struct SetStatusRequest {
    status: ApplicationStatus,
}

#[derive(Deserialize)]
struct AddMemberRequest {
    user_id: Uuid,
}

#[derive(Serialize)]
struct GroupResponse {
    success: bool,
    message: String,
    group: Group,
    members: Vec<Uuid>,
}

#[derive(Deserialize)]
struct AdminUserRequest {
    id: Option<Uuid>,
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct AdminDutyRequest {
    id: Option<Uuid>,
    title: String,
    description: Option<String>,
    created_by: Uuid,
}

#[derive(Serialize)]
struct AdminUserResponse {
    success: bool,
    user: UserRef,
}

#[derive(Serialize)]
struct AdminDutyResponse {
    success: bool,
    duty: Duty,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn follow(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<FollowRequest>,
) -> Result<Json<FriendshipResponse>, ApiError> {
    let caller = caller_id(&headers)?;
    let (friendship, outcome) = state.graph.request_or_accept(caller, req.recipient_id).await?;
    let message = match outcome {
        FollowOutcome::Requested => "Friend request sent",
        FollowOutcome::Accepted => "Friend request accepted",
    };
    Ok(Json(FriendshipResponse {
        success: true,
        message: message.to_string(),
        friendship,
    }))
}

async fn accept_request(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<AcceptRequest>,
) -> Result<Json<FriendshipResponse>, ApiError> {
    let caller = caller_id(&headers)?;
    let friendship = state.graph.accept(caller, req.user_id).await?;
    Ok(Json(FriendshipResponse {
        success: true,
        message: "Friend request accepted".to_string(),
        friendship,
    }))
}

async fn unfollow(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<AckResponse>, ApiError> {
    let caller = caller_id(&headers)?;
    state.graph.unfollow(caller, user_id).await?;
    Ok(Json(AckResponse {
        success: true,
        message: "Unfollowed".to_string(),
    }))
}

async fn list_friends(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<FriendsResponse>, ApiError> {
    let caller = caller_id(&headers)?;
    let friends = state.graph.list_accepted(caller).await?;
    Ok(Json(FriendsResponse {
        success: true,
        friends,
    }))
}

async fn friend_status(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<FriendStatusResponse>, ApiError> {
    let caller = caller_id(&headers)?;
    let status = state.graph.status_for(caller, user_id).await?;
    Ok(Json(FriendStatusResponse {
        success: true,
        status,
    }))
}

async fn send_message(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let caller = caller_id(&headers)?;
    let message = state
        .ledger
        .send(caller, req.recipient_id, &req.content)
        .await?;
    Ok(Json(SendMessageResponse {
        success: true,
        message,
    }))
}

async fn list_conversations(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<ConversationsResponse>, ApiError> {
    let caller = caller_id(&headers)?;
    let conversations = state.ledger.list_conversations(caller).await?;
    Ok(Json(ConversationsResponse {
        success: true,
        conversations,
    }))
}

async fn list_messages(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessagesResponse>, ApiError> {
    let caller = caller_id(&headers)?;
    let messages = state.ledger.list_messages(caller, id).await?;
    Ok(Json(MessagesResponse {
        success: true,
        messages,
    }))
}

async fn list_notifications(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<NotificationsQuery>,
) -> Result<Json<NotificationsResponse>, ApiError> {
    let caller = caller_id(&headers)?;
    let limit = query.limit.unwrap_or(50);
    let (notifications, unread_count) =
        state.hub.list(caller, query.unread_only, limit).await?;
    Ok(Json(NotificationsResponse {
        success: true,
        notifications,
        unread_count,
    }))
}

async fn mark_notification_read(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AckResponse>, ApiError> {
    let caller = caller_id(&headers)?;
    state.hub.mark_read(caller, id).await?;
    Ok(Json(AckResponse {
        success: true,
        message: "Notification marked read".to_string(),
    }))
}

async fn mark_all_notifications_read(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<AckResponse>, ApiError> {
    let caller = caller_id(&headers)?;
    let marked = state.hub.mark_all_read(caller).await?;
    Ok(Json(AckResponse {
        success: true,
        message: format!("{marked} notifications marked read"),
    }))
}

async fn delete_notification(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AckResponse>, ApiError> {
    let caller = caller_id(&headers)?;
    state.hub.delete(caller, id).await?;
    Ok(Json(AckResponse {
        success: true,
        message: "Notification deleted".to_string(),
    }))
}

async fn apply_to_duty(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(duty_id): Path<Uuid>,
) -> Result<Json<ApplicationResponse>, ApiError> {
    let caller = caller_id(&headers)?;
    let application = state.lifecycle.apply(caller, duty_id).await?;
    Ok(Json(ApplicationResponse {
        success: true,
        message: "Application submitted".to_string(),
        application,
    }))
}

async fn set_application_status(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetStatusRequest>,
) -> Result<Json<ApplicationResponse>, ApiError> {
    require_admin(&headers, &state.config)?;
    let application = state.lifecycle.set_status(id, req.status).await?;
    Ok(Json(ApplicationResponse {
        success: true,
        message: format!("Application {}", application.status.as_str()),
        application,
    }))
}

async fn add_group_member(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(duty_id): Path<Uuid>,
    Json(req): Json<AddMemberRequest>,
) -> Result<Json<GroupResponse>, ApiError> {
    require_admin(&headers, &state.config)?;
    let group = state.lifecycle.ensure_membership(duty_id, req.user_id).await?;
    let (group, members) = {
        let db = state.db.lock().await;
        let members = db.list_group_members(group.id)?;
        (group, members)
    };
    info!(group = %group.id, user = %req.user_id, "member added via admin bulk path");
    Ok(Json(GroupResponse {
        success: true,
        message: "Member ensured".to_string(),
        group,
        members,
    }))
}

async fn get_group(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(duty_id): Path<Uuid>,
) -> Result<Json<GroupResponse>, ApiError> {
    let _caller = caller_id(&headers)?;
    let (group, members) = state.lifecycle.group_for_duty(duty_id).await?;
    Ok(Json(GroupResponse {
        success: true,
        message: "OK".to_string(),
        group,
        members,
    }))
}

async fn remove_group_member(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<AckResponse>, ApiError> {
    let caller = caller_id(&headers)?;
    let admin = is_admin(&headers, &state.config);
    state
        .lifecycle
        .remove_member(group_id, user_id, caller, admin)
        .await?;
    Ok(Json(AckResponse {
        success: true,
        message: "Member removed".to_string(),
    }))
}

async fn push_stream(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let caller = caller_id(&headers)?;
    Ok(state.push.stream_for(caller))
}

async fn admin_upsert_user(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<AdminUserRequest>,
) -> Result<Json<AdminUserResponse>, ApiError> {
    require_admin(&headers, &state.config)?;
    let user = UserRef {
        id: req.id.unwrap_or_else(Uuid::new_v4),
        display_name: req.display_name,
        created_at: chrono::Utc::now(),
    };
    {
        let db = state.db.lock().await;
        db.upsert_user(&user)?;
    }
    Ok(Json(AdminUserResponse {
        success: true,
        user,
    }))
}

async fn admin_upsert_duty(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<AdminDutyRequest>,
) -> Result<Json<AdminDutyResponse>, ApiError> {
    require_admin(&headers, &state.config)?;
    if req.title.trim().is_empty() {
        return Err(ApiError::Validation("Duty title is required".into()));
    }
    let duty = Duty {
        id: req.id.unwrap_or_else(Uuid::new_v4),
        title: req.title,
        description: req.description,
        created_by: req.created_by,
        created_at: chrono::Utc::now(),
    };
    {
        let db = state.db.lock().await;
        db.upsert_duty(&duty)?;
    }
    Ok(Json(AdminDutyResponse {
        success: true,
        duty,
    }))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_id_parses_header() {
        let mut headers = HeaderMap::new();
        assert!(caller_id(&headers).is_err());

        let id = Uuid::new_v4();
        headers.insert("x-user-id", id.to_string().parse().unwrap());
        assert_eq!(caller_id(&headers).unwrap(), id);

        headers.insert("x-user-id", "not-a-uuid".parse().unwrap());
        assert!(caller_id(&headers).is_err());
    }

    #[test]
    fn admin_token_checks() {
        let mut config = ServerConfig::default();
        let headers = HeaderMap::new();

        // Disabled admin API rejects everything.
        assert!(require_admin(&headers, &config).is_err());

        config.admin_token = Some("sesame".to_string());
        assert!(require_admin(&headers, &config).is_err());

        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer sesame".parse().unwrap());
        assert!(require_admin(&headers, &config).is_ok());
        assert!(is_admin(&headers, &config));

        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer wrong".parse().unwrap());
        assert!(require_admin(&headers, &config).is_err());
        assert!(!is_admin(&headers, &config));
    }
}
