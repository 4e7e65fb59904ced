use std::time::Duration;

/// Default socket endpoint for local development.
pub const DEFAULT_SOCKET_URL: &str = "ws://localhost:5003/socket";

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// WebSocket endpoint (`ws://` or `wss://`).
    pub url: String,
    /// Deadline for the dial plus authenticate handshake.
    pub handshake_timeout: Duration,
    /// Deadline for acknowledgement-style calls (`add_friend`).
    pub ack_timeout: Duration,
}

impl SocketConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Read the endpoint from `CAUSERIE_SERVER_URL`, falling back to the
    /// local development default.
    pub fn from_env() -> Self {
        let url =
            std::env::var("CAUSERIE_SERVER_URL").unwrap_or_else(|_| DEFAULT_SOCKET_URL.into());
        Self::new(url)
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SOCKET_URL.into(),
            handshake_timeout: Duration::from_secs(10),
            ack_timeout: Duration::from_secs(10),
        }
    }
}
