use thiserror::Error;

/// Errors produced by the REST layer. Display strings double as the
/// user-facing error-slot text.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Connection-level failure (DNS, TLS, timeout) or undecodable body.
    #[error("网络异常，请稍后再试")]
    Network(#[source] reqwest::Error),

    /// The server rejected the request; `message` is extracted from the
    /// response body and surfaced verbatim.
    #[error("{message}")]
    Server { status: u16, message: String },

    /// 401: the session is no longer valid. Persisted credentials have
    /// already been cleared when this is returned.
    #[error("登录已过期，请重新登录")]
    Unauthorized,

    /// Persistence failure while reading or clearing the session.
    #[error("Store error: {0}")]
    Store(#[from] causerie_store::StoreError),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ApiError>;
