//! # causerie-client
//!
//! The session layer of the Causerie chat client. [`ChatSession`] ties the
//! persistent store, the REST client, and the real-time socket together
//! around a single reducer-driven [`ChatState`]; a front-end drives logical
//! operations on the session and renders snapshots of the state.

pub mod session;
pub mod state;

mod error;
mod errors;
mod events;
mod lookup;

pub use error::SessionError;
pub use session::{ChatSession, SessionConfig};
pub use state::{reduce, Action, ChatState, UserInfo};

/// Install the default tracing subscriber.
///
/// Honors `RUST_LOG`; without it, client crates log at debug and everything
/// else at warn. Safe to call more than once.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("causerie_client=debug,causerie_net=debug,causerie_store=info,warn")
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
