//! The public socket client facade.
//!
//! Two-phase lifecycle: [`SocketClient::initialize`] binds credentials
//! without opening anything; [`SocketClient::connect`] dials, runs the
//! authenticate handshake, and spawns the I/O task. Emits after
//! [`SocketClient::disconnect`] are silently dropped.

use futures::{SinkExt, StreamExt};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use causerie_shared::events::EVENT_CONNECTED;
use causerie_shared::{
    ChatId, ClientEvent, CreateGroup, Frame, FriendAdded, MessageKind, ServerEvent, UpdateProfile,
    UserId,
};

use crate::config::SocketConfig;
use crate::conn::{self, SocketCommand};
use crate::error::{Result, SocketError};

/// Channel capacity for outbound commands.
const COMMAND_BUFFER: usize = 64;

struct ConnectionHandle {
    /// Token the live connection authenticated with.
    token: String,
    cmd_tx: mpsc::Sender<SocketCommand>,
}

#[derive(Default)]
struct Inner {
    token: Option<String>,
    conn: Option<ConnectionHandle>,
}

/// One real-time connection per authenticated session.
pub struct SocketClient {
    config: SocketConfig,
    inner: Mutex<Inner>,
}

impl SocketClient {
    pub fn new(config: SocketConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind credentials without opening the connection.
    ///
    /// Re-initializing with the token of the live connection is a no-op;
    /// a changed token tears the old connection down so the next
    /// [`connect`](Self::connect) dials fresh.
    pub fn initialize(&self, token: &str) {
        let mut inner = self.inner();
        if let Some(conn) = &inner.conn {
            if conn.token == token && !conn.cmd_tx.is_closed() {
                return;
            }
            debug!("token changed, dropping previous connection");
            let _ = conn.cmd_tx.try_send(SocketCommand::Shutdown);
            inner.conn = None;
        }
        inner.token = Some(token.to_string());
    }

    /// Dial the server and perform the authenticate handshake.
    ///
    /// On a fresh connection, returns the single-owner event receiver the
    /// session pump consumes. Returns `Ok(None)` when the live connection
    /// already matches the bound token.
    pub async fn connect(&self) -> Result<Option<mpsc::UnboundedReceiver<ServerEvent>>> {
        let token = {
            let inner = self.inner();
            if let (Some(conn), Some(token)) = (&inner.conn, &inner.token) {
                if conn.token == *token && !conn.cmd_tx.is_closed() {
                    return Ok(None);
                }
            }
            inner.token.clone().ok_or(SocketError::NotInitialized)?
        };

        // Validate the endpoint before dialing so a bad config fails loudly.
        Url::parse(&self.config.url)?;

        info!(url = %self.config.url, "connecting socket");
        let (ws, _response) = timeout(
            self.config.handshake_timeout,
            connect_async(self.config.url.as_str()),
        )
        .await
        .map_err(|_| SocketError::Timeout)??;

        let (mut sink, mut stream) = ws.split();

        let auth = ClientEvent::Authenticate {
            token: token.clone(),
        }
        .to_frame(None)?
        .encode()?;
        sink.send(Message::Text(auth)).await?;

        // Wait for the server to accept the credential payload.
        loop {
            let msg = timeout(self.config.handshake_timeout, stream.next())
                .await
                .map_err(|_| SocketError::Timeout)?;
            match msg {
                Some(Ok(Message::Text(text))) => {
                    let frame = Frame::decode(&text)?;
                    match frame.event.as_str() {
                        EVENT_CONNECTED => break,
                        "error" => {
                            let message = frame
                                .data
                                .get("message")
                                .and_then(|v| v.as_str())
                                .unwrap_or("authentication rejected")
                                .to_string();
                            return Err(SocketError::Handshake(message));
                        }
                        other => debug!(event = other, "frame before handshake completion"),
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(SocketError::Handshake(
                        "connection closed during handshake".into(),
                    ));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            }
        }

        info!("socket handshake complete");

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        tokio::spawn(conn::run(sink, stream, cmd_rx, event_tx));

        let mut inner = self.inner();
        if let Some(old) = inner.conn.replace(ConnectionHandle { token, cmd_tx }) {
            let _ = old.cmd_tx.try_send(SocketCommand::Shutdown);
        }
        Ok(Some(event_rx))
    }

    /// Tear down the connection and forget the credentials. Safe to call when
    /// already disconnected.
    pub fn disconnect(&self) {
        let mut inner = self.inner();
        if let Some(conn) = inner.conn.take() {
            let _ = conn.cmd_tx.try_send(SocketCommand::Shutdown);
            info!("socket disconnected");
        }
        inner.token = None;
    }

    pub fn is_connected(&self) -> bool {
        self.inner()
            .conn
            .as_ref()
            .map(|c| !c.cmd_tx.is_closed())
            .unwrap_or(false)
    }

    // -- outbound emits ------------------------------------------------------

    fn emit(&self, event: ClientEvent) {
        let inner = self.inner();
        match &inner.conn {
            Some(conn) => {
                if conn.cmd_tx.try_send(SocketCommand::Emit(event)).is_err() {
                    debug!("emit dropped, connection gone or saturated");
                }
            }
            None => debug!("emit dropped, socket not connected"),
        }
    }

    pub fn get_private_chat(&self, recipient_id: &UserId) {
        self.emit(ClientEvent::GetPrivateChat {
            recipient_id: recipient_id.clone(),
        });
    }

    pub fn create_group(&self, group: CreateGroup) {
        self.emit(ClientEvent::CreateGroup(group));
    }

    pub fn send_message(&self, chat_id: &ChatId, content: &str, kind: MessageKind) {
        self.emit(ClientEvent::SendMessage {
            chat_id: chat_id.clone(),
            content: content.to_string(),
            kind,
        });
    }

    pub fn mark_messages_read(&self, chat_id: &ChatId) {
        self.emit(ClientEvent::MarkMessagesRead {
            chat_id: chat_id.clone(),
        });
    }

    pub fn typing_start(&self, chat_id: &ChatId) {
        self.emit(ClientEvent::TypingStart {
            chat_id: chat_id.clone(),
        });
    }

    pub fn typing_stop(&self, chat_id: &ChatId) {
        self.emit(ClientEvent::TypingStop {
            chat_id: chat_id.clone(),
        });
    }

    pub fn leave_group(&self, chat_id: &ChatId) {
        self.emit(ClientEvent::LeaveGroup {
            chat_id: chat_id.clone(),
        });
    }

    pub fn update_profile(&self, update: UpdateProfile) {
        self.emit(ClientEvent::UpdateProfile(update));
    }

    /// The sole acknowledgement-style call: resolves with the created chat or
    /// rejects with the server's error string, a disconnect, or a timeout.
    pub async fn add_friend(&self, name: &str) -> Result<FriendAdded> {
        let cmd_tx = self
            .inner()
            .conn
            .as_ref()
            .map(|c| c.cmd_tx.clone())
            .ok_or(SocketError::NotConnected)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        cmd_tx
            .send(SocketCommand::AddFriend {
                name: name.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| SocketError::NotConnected)?;

        match timeout(self.config.ack_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SocketError::NotConnected),
            Err(_) => {
                warn!(name, "add_friend acknowledgement timed out");
                Err(SocketError::Timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_before_connect_are_dropped() {
        let client = SocketClient::new(SocketConfig::default());
        // Must not panic or block.
        client.send_message(&ChatId::new("c1"), "hi", MessageKind::Text);
        client.typing_start(&ChatId::new("c1"));
        assert!(!client.is_connected());
    }

    #[test]
    fn initialize_binds_token_without_connecting() {
        let client = SocketClient::new(SocketConfig::default());
        client.initialize("jwt");
        assert!(!client.is_connected());
        // Same token again is a no-op either way.
        client.initialize("jwt");
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn connect_without_initialize_fails() {
        let client = SocketClient::new(SocketConfig::default());
        match client.connect().await {
            Err(SocketError::NotInitialized) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn connect_rejects_invalid_url() {
        let client = SocketClient::new(SocketConfig::new("not a url"));
        client.initialize("jwt");
        match client.connect().await {
            Err(SocketError::Url(_)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn add_friend_requires_connection() {
        let client = SocketClient::new(SocketConfig::default());
        match client.add_friend("bob").await {
            Err(SocketError::NotConnected) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
