//! # muster-shared
//!
//! Types shared between the Muster store and server crates: the domain
//! enums, the canonical user-pair used to key undirected relationships, and
//! the push protocol events delivered over the SSE stream.

pub mod protocol;
pub mod types;

pub use types::*;
