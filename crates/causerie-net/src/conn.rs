//! The connection I/O task.
//!
//! Owns the split WebSocket stream for the lifetime of one connection.
//! Commands arrive on an mpsc channel; decoded [`ServerEvent`]s leave on an
//! unbounded channel whose receiver the session container owns. Pending
//! acknowledgements are tracked here, keyed by ack id, and settled when the
//! matching `ack` frame arrives or the connection dies.

use std::collections::HashMap;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use causerie_shared::events::{EVENT_ACK, EVENT_CONNECTED};
use causerie_shared::{ClientEvent, Frame, FriendAdded, ServerEvent};

use crate::error::{Result, SocketError};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

type AckMap = HashMap<u64, oneshot::Sender<Result<FriendAdded>>>;

/// Commands sent *into* the connection task.
#[derive(Debug)]
pub(crate) enum SocketCommand {
    /// Fire-and-forget emit.
    Emit(ClientEvent),
    /// Acknowledgement-style call: the reply settles when the ack arrives.
    AddFriend {
        name: String,
        reply: oneshot::Sender<Result<FriendAdded>>,
    },
    /// Tear the connection down.
    Shutdown,
}

/// Run the connection until shutdown, command-channel closure, or a stream
/// failure. Outstanding acknowledgements are rejected on exit.
pub(crate) async fn run(
    mut sink: SplitSink<WsStream, Message>,
    mut stream: SplitStream<WsStream>,
    mut cmd_rx: mpsc::Receiver<SocketCommand>,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
) {
    let mut pending: AckMap = HashMap::new();
    let mut next_ack_id: u64 = 1;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(SocketCommand::Emit(event)) => {
                    if let Err(e) = send_frame(&mut sink, &event, None).await {
                        warn!(error = %e, "emit failed, closing connection");
                        break;
                    }
                }
                Some(SocketCommand::AddFriend { name, reply }) => {
                    let ack_id = next_ack_id;
                    next_ack_id += 1;
                    let event = ClientEvent::AddFriend { name };
                    match send_frame(&mut sink, &event, Some(ack_id)).await {
                        Ok(()) => {
                            pending.insert(ack_id, reply);
                        }
                        Err(e) => {
                            warn!(error = %e, "add_friend emit failed");
                            let _ = reply.send(Err(e));
                            break;
                        }
                    }
                }
                Some(SocketCommand::Shutdown) | None => {
                    debug!("connection task shutting down");
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    handle_text(&text, &event_tx, &mut pending);
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = sink.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!("server closed the connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "websocket stream error");
                    break;
                }
            },
        }
    }

    for (_, reply) in pending.drain() {
        let _ = reply.send(Err(SocketError::NotConnected));
    }
}

async fn send_frame(
    sink: &mut SplitSink<WsStream, Message>,
    event: &ClientEvent,
    ack_id: Option<u64>,
) -> Result<()> {
    let text = event.to_frame(ack_id)?.encode()?;
    sink.send(Message::Text(text)).await?;
    Ok(())
}

/// Route one inbound text frame: settle an ack, forward a typed event, or
/// drop it with a log line.
fn handle_text(text: &str, event_tx: &mpsc::UnboundedSender<ServerEvent>, pending: &mut AckMap) {
    let frame = match Frame::decode(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "dropping undecodable frame");
            return;
        }
    };

    if frame.event == EVENT_ACK {
        let Some(ack_id) = frame.ack_id else {
            warn!("ack frame without ackId");
            return;
        };
        match pending.remove(&ack_id) {
            Some(reply) => {
                let _ = reply.send(parse_ack(frame.data));
            }
            None => debug!(ack_id, "ack for unknown or expired call"),
        }
        return;
    }

    if frame.event == EVENT_CONNECTED {
        return;
    }

    let name = frame.event.clone();
    match ServerEvent::from_frame(frame) {
        Ok(Some(event)) => {
            // Receiver dropped means the session is gone; nothing to do.
            let _ = event_tx.send(event);
        }
        Ok(None) => debug!(event = %name, "ignoring unhandled event"),
        Err(e) => warn!(event = %name, error = %e, "dropping malformed event payload"),
    }
}

/// An ack payload either carries an `error` string or the friend-added
/// record.
fn parse_ack(data: serde_json::Value) -> Result<FriendAdded> {
    if let Some(message) = data.get("error").and_then(|v| v.as_str()) {
        return Err(SocketError::Server(message.to_string()));
    }
    serde_json::from_value(data).map_err(SocketError::Frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use causerie_shared::ChatId;

    fn channels() -> (
        mpsc::UnboundedSender<ServerEvent>,
        mpsc::UnboundedReceiver<ServerEvent>,
    ) {
        mpsc::unbounded_channel()
    }

    fn friend_added_json() -> String {
        r#"{
            "chat": {
                "id": "c9",
                "type": "private",
                "participants": ["me", "bob"],
                "createdAt": "2024-05-01T12:00:00Z"
            }
        }"#
        .to_string()
    }

    #[test]
    fn ack_resolves_pending_call() {
        let (event_tx, _event_rx) = channels();
        let mut pending = AckMap::new();
        let (reply_tx, mut reply_rx) = oneshot::channel();
        pending.insert(3, reply_tx);

        let text = format!(
            r#"{{"event":"ack","ackId":3,"data":{}}}"#,
            friend_added_json()
        );
        handle_text(&text, &event_tx, &mut pending);

        let added = reply_rx.try_recv().unwrap().unwrap();
        assert_eq!(added.chat.id, ChatId::new("c9"));
        assert!(pending.is_empty());
    }

    #[test]
    fn ack_error_rejects_pending_call() {
        let (event_tx, _event_rx) = channels();
        let mut pending = AckMap::new();
        let (reply_tx, mut reply_rx) = oneshot::channel();
        pending.insert(1, reply_tx);

        let text = r#"{"event":"ack","ackId":1,"data":{"error":"User not found"}}"#;
        handle_text(text, &event_tx, &mut pending);

        match reply_rx.try_recv().unwrap() {
            Err(SocketError::Server(msg)) => assert_eq!(msg, "User not found"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn unmatched_ack_is_ignored() {
        let (event_tx, _event_rx) = channels();
        let mut pending = AckMap::new();
        let text = r#"{"event":"ack","ackId":42,"data":{}}"#;
        handle_text(text, &event_tx, &mut pending);
    }

    #[test]
    fn typed_events_are_forwarded() {
        let (event_tx, mut event_rx) = channels();
        let mut pending = AckMap::new();

        let text = r#"{"event":"left_group","data":{"chatId":"c1"}}"#;
        handle_text(text, &event_tx, &mut pending);

        match event_rx.try_recv().unwrap() {
            ServerEvent::LeftGroup { chat_id } => assert_eq!(chat_id, ChatId::new("c1")),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn garbage_frames_are_dropped() {
        let (event_tx, mut event_rx) = channels();
        let mut pending = AckMap::new();

        handle_text("not json at all", &event_tx, &mut pending);
        handle_text(r#"{"event":"new_message","data":{"bad":true}}"#, &event_tx, &mut pending);

        assert!(event_rx.try_recv().is_err());
    }
}
