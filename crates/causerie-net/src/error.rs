use thiserror::Error;

/// Errors produced by the transport layer.
#[derive(Error, Debug)]
pub enum SocketError {
    /// `connect()` was called before `initialize(token)`.
    #[error("Socket not initialized")]
    NotInitialized,

    /// The connection is gone; the emit or call could not be delivered.
    #[error("Socket not connected")]
    NotConnected,

    /// The server rejected the authenticate handshake.
    #[error("Connection handshake failed: {0}")]
    Handshake(String),

    /// Dial, handshake, or acknowledgement wait exceeded its deadline.
    #[error("Connection timed out")]
    Timeout,

    /// Underlying WebSocket failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The configured server URL is not parseable.
    #[error("Invalid server URL: {0}")]
    Url(#[from] url::ParseError),

    /// A frame could not be encoded or decoded.
    #[error("Malformed frame: {0}")]
    Frame(#[from] serde_json::Error),

    /// An error string carried in an acknowledgement payload.
    #[error("{0}")]
    Server(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SocketError>;
