//! # causerie-net
//!
//! Real-time socket transport for the Causerie client. One WebSocket
//! connection per authenticated session, run as a background tokio task that
//! external code drives through typed channels: a command sender for outbound
//! emits and a single-owner receiver of decoded [`ServerEvent`]s.
//!
//! [`ServerEvent`]: causerie_shared::ServerEvent

pub mod config;
pub mod socket;

mod conn;
mod error;

pub use config::SocketConfig;
pub use error::SocketError;
pub use socket::SocketClient;
