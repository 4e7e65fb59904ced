//! The REST client.
//!
//! Auth endpoints (`/auth/login`, `/auth/register`) answer with a
//! `{success, data, error}` envelope; everything else returns the resource
//! directly. All failures are normalized to a single error shape carrying a
//! human-readable message.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use causerie_shared::{
    AuthResponse, LoginRequest, RegisterRequest, UpdateProfile, User, UserId,
};
use causerie_store::SessionStore;

use crate::error::{ApiError, Result};

/// Default REST endpoint for local development.
pub const DEFAULT_API_URL: &str = "http://localhost:5003/api";

/// Fixed per-request timeout; there is no retry or cancellation wiring.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// REST client; stateless except for the bearer token read from the session
/// store on every request.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    store: Arc<SessionStore>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, store: Arc<SessionStore>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            store,
        })
    }

    /// Read the endpoint from `CAUSERIE_API_URL`, falling back to the local
    /// development default.
    pub fn from_env(store: Arc<SessionStore>) -> Result<Self> {
        let base_url =
            std::env::var("CAUSERIE_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into());
        Self::new(base_url, store)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach the bearer token, send, and normalize failures.
    ///
    /// A 401 clears the persisted session before returning
    /// [`ApiError::Unauthorized`], regardless of which call triggered it.
    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let req = match self.store.token()? {
            Some(token) => req.bearer_auth(token),
            None => req,
        };

        let response = req.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            warn!("401 from server, clearing persisted session");
            if let Err(e) = self.store.clear_auth() {
                warn!(error = %e, "failed to clear persisted session");
            }
            return Err(ApiError::Unauthorized);
        }

        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(ApiError::Server {
                status: status.as_u16(),
                message: extract_error_message(status, &body),
            });
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!(path, "GET");
        let response = self.send(self.http.get(self.url(path))).await?;
        Ok(response.json().await?)
    }

    async fn auth_call(&self, path: &str, body: &impl serde::Serialize) -> Result<AuthResponse> {
        let response = self.send(self.http.post(self.url(path)).json(body)).await?;
        let envelope: Envelope<AuthResponse> = response.json().await?;
        match envelope.data {
            Some(data) if envelope.success => Ok(data),
            _ => Err(ApiError::Server {
                status: 200,
                message: envelope
                    .error
                    .or(envelope.message)
                    .unwrap_or_else(|| "服务器返回了无法识别的响应".to_string()),
            }),
        }
    }

    // -- auth ----------------------------------------------------------------

    pub async fn login(&self, request: &LoginRequest) -> Result<AuthResponse> {
        self.auth_call("/auth/login", request).await
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse> {
        self.auth_call("/auth/register", request).await
    }

    /// The canonical record for the authenticated user.
    pub async fn current_user(&self) -> Result<User> {
        self.get_json("/auth/me").await
    }

    // -- users ---------------------------------------------------------------

    pub async fn users(&self) -> Result<Vec<User>> {
        self.get_json("/users").await
    }

    pub async fn user(&self, id: &UserId) -> Result<User> {
        self.get_json(&format!("/users/{id}")).await
    }

    pub async fn online_users(&self) -> Result<Vec<User>> {
        self.get_json("/users/online/list").await
    }

    pub async fn update_user(&self, id: &UserId, update: &UpdateProfile) -> Result<User> {
        let response = self
            .send(self.http.put(self.url(&format!("/users/{id}"))).json(update))
            .await?;
        Ok(response.json().await?)
    }

    // -- misc ----------------------------------------------------------------

    pub async fn health(&self) -> Result<()> {
        self.send(self.http.get(self.url("/health"))).await?;
        Ok(())
    }
}

/// Pull a human-readable message out of an error response body, falling back
/// to the HTTP status line.
fn extract_error_message(status: StatusCode, body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        for key in ["error", "message"] {
            if let Some(message) = value.get(key).and_then(|v| v.as_str()) {
                if !message.is_empty() {
                    return message.to_string();
                }
            }
        }
    }
    status
        .canonical_reason()
        .unwrap_or("Request failed")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_error_field() {
        let body = br#"{"error": "Username already exists", "message": "nope"}"#;
        assert_eq!(
            extract_error_message(StatusCode::BAD_REQUEST, body),
            "Username already exists"
        );
    }

    #[test]
    fn error_message_falls_back_to_message_field() {
        let body = br#"{"message": "User not found"}"#;
        assert_eq!(
            extract_error_message(StatusCode::NOT_FOUND, body),
            "User not found"
        );
    }

    #[test]
    fn error_message_falls_back_to_status_line() {
        assert_eq!(
            extract_error_message(StatusCode::BAD_GATEWAY, b"<html>oops</html>"),
            "Bad Gateway"
        );
    }

    #[test]
    fn envelope_parses_failure_shape() {
        let env: Envelope<AuthResponse> =
            serde_json::from_str(r#"{"success": false, "error": "bad credentials"}"#).unwrap();
        assert!(!env.success);
        assert!(env.data.is_none());
        assert_eq!(env.error.as_deref(), Some("bad credentials"));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let store = Arc::new(SessionStore::open_in_memory().unwrap());
        let client = ApiClient::new("http://localhost:5003/api/", store).unwrap();
        assert_eq!(client.url("/users"), "http://localhost:5003/api/users");
    }
}
