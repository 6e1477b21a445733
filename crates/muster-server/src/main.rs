//! # muster-server
//!
//! Coordination server for the Muster volunteer network.
//!
//! This binary provides:
//! - **Relationship graph** tracking friend requests and accepted friendships
//! - **Conversations** between mutual friends, one per pair, with read
//!   tracking
//! - **Notifications** rendered from a fixed template set
//! - **Duty applications** and the volunteer groups they feed into
//! - **Push stream** (SSE) that delivers new messages and notifications to
//!   connected clients
//! - **REST API** (axum) for all of the above

mod api;
mod applications;
mod config;
mod conversations;
mod error;
mod friends;
mod notifications;
mod push;
#[cfg(test)]
mod testutil;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use muster_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,muster_server=debug")),
        )
        .init();

    info!("Starting Muster server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");
    info!(
        instance = %config.instance_name,
        poll_interval_ms = config.push_poll_interval.as_millis() as u64,
        admin_enabled = config.admin_token.is_some(),
        "Instance settings"
    );

    // -----------------------------------------------------------------------
    // 3. Open the database
    // -----------------------------------------------------------------------
    let database = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    match database.path() {
        Some(path) => info!(path = %path.display(), "Database ready"),
        None => info!("Database ready (in-memory)"),
    }
    let db = Arc::new(Mutex::new(database));

    // -----------------------------------------------------------------------
    // 4. Wire up services and run the HTTP API (blocks until shutdown)
    // -----------------------------------------------------------------------
    let http_addr = config.http_addr;
    let state = AppState::new(db, Arc::new(config));

    api::serve(state, http_addr).await?;

    info!("Server shut down");
    Ok(())
}
