//! # causerie-store
//!
//! Durable session state for the Causerie client: bearer token, current user
//! snapshot, last-active-chat id, and the user-info cache. Backed by a small
//! key-value table in a local SQLite database.
//!
//! The store is a mirror of a subset of in-memory session state, read only at
//! startup; it is never the source of truth while a session is live.

pub mod database;
pub mod migrations;
pub mod session;

mod error;

pub use database::SessionStore;
pub use error::StoreError;
pub use session::{deserialize_user_cache, serialize_user_cache};
