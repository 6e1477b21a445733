//! # muster-store
//!
//! SQLite persistence for the Muster social core.  The crate exposes a
//! synchronous [`Database`] handle that wraps a `rusqlite::Connection` and
//! provides typed CRUD helpers for every domain model: friendships,
//! conversations, messages, notifications, duty applications, and groups,
//! plus read-only mirrors of the externally-owned `users` and `duties`
//! collections.

pub mod applications;
pub mod conversations;
pub mod database;
pub mod duties;
pub mod friends;
pub mod groups;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod notifications;
pub mod users;

mod error;
mod util;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
