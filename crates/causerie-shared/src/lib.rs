//! # causerie-shared
//!
//! Domain model and wire types shared by every Causerie crate: users, chats,
//! messages, presence, and the JSON frame envelope spoken over the real-time
//! socket. All wire-facing structs serialize with `camelCase` field names to
//! match the server's JSON.

pub mod events;
pub mod models;
pub mod types;

pub use events::{ClientEvent, Frame, FriendAdded, ServerEvent};
pub use models::*;
pub use types::{ChatId, UserId};
