//! Wire event types for the real-time socket.
//!
//! The socket speaks JSON text frames of the shape
//! `{"event": <name>, "data": <payload>, "ackId": <n>?}`. Inbound frames are
//! decoded into [`ServerEvent`]; outbound emits are built from
//! [`ClientEvent`]. Acknowledgement replies arrive as `event = "ack"` frames
//! carrying the `ackId` of the originating emit.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{
    Chat, CreateGroup, Message, MessageKind, SocketUser, TypingUser, UpdateProfile, UserStatus,
};
use crate::types::{ChatId, UserId};

/// Frame name used for acknowledgement replies.
pub const EVENT_ACK: &str = "ack";
/// Frame name confirming a successful authenticate handshake.
pub const EVENT_CONNECTED: &str = "connected";

// ---------------------------------------------------------------------------
// Frame envelope
// ---------------------------------------------------------------------------

/// The JSON envelope every socket frame is wrapped in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            ack_id: None,
            data,
        }
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

// ---------------------------------------------------------------------------
// Inbound events
// ---------------------------------------------------------------------------

/// `friend_added` payload, also returned by the `add_friend` ack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FriendAdded {
    pub chat: Chat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friend: Option<crate::models::User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusChange {
    user_id: UserId,
    status: UserStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrivateChatLoaded {
    chat: Chat,
    #[serde(default)]
    messages: Vec<Message>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatUser {
    chat_id: ChatId,
    user_id: UserId,
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Typing {
    chat_id: ChatId,
    user: TypingUser,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRef {
    chat_id: ChatId,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorPayload {
    message: String,
}

/// Typed inbound socket events, in server delivery order.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    ChatsLoaded(Vec<Chat>),
    OnlineUsers(Vec<SocketUser>),
    UserStatusChanged {
        user_id: UserId,
        status: UserStatus,
    },
    PrivateChatLoaded {
        chat: Chat,
        messages: Vec<Message>,
    },
    GroupCreated(Chat),
    GroupCreatedSuccess(Chat),
    NewMessage(Message),
    MessagesRead {
        chat_id: ChatId,
        user_id: UserId,
    },
    FriendAdded(FriendAdded),
    UserTyping {
        chat_id: ChatId,
        user: TypingUser,
    },
    UserStopTyping {
        chat_id: ChatId,
        user_id: UserId,
    },
    UserLeftGroup {
        chat_id: ChatId,
        user_id: UserId,
        message: Option<Message>,
    },
    LeftGroup {
        chat_id: ChatId,
    },
    UserProfileUpdated(SocketUser),
    Error {
        message: String,
    },
}

impl ServerEvent {
    /// Decode a frame into a typed event.
    ///
    /// Returns `Ok(None)` for event names this client does not consume
    /// (including the `ack` and `connected` frames, which are handled at the
    /// connection layer).
    pub fn from_frame(frame: Frame) -> serde_json::Result<Option<Self>> {
        let data = frame.data;
        let event = match frame.event.as_str() {
            "chats_loaded" => Self::ChatsLoaded(serde_json::from_value(data)?),
            "online_users" => Self::OnlineUsers(serde_json::from_value(data)?),
            "user_status_changed" => {
                let p: StatusChange = serde_json::from_value(data)?;
                Self::UserStatusChanged {
                    user_id: p.user_id,
                    status: p.status,
                }
            }
            "private_chat_loaded" => {
                let p: PrivateChatLoaded = serde_json::from_value(data)?;
                Self::PrivateChatLoaded {
                    chat: p.chat,
                    messages: p.messages,
                }
            }
            "group_created" => Self::GroupCreated(serde_json::from_value(data)?),
            "group_created_success" => Self::GroupCreatedSuccess(serde_json::from_value(data)?),
            "new_message" => Self::NewMessage(serde_json::from_value(data)?),
            "messages_read" => {
                let p: ChatUser = serde_json::from_value(data)?;
                Self::MessagesRead {
                    chat_id: p.chat_id,
                    user_id: p.user_id,
                }
            }
            "friend_added" => Self::FriendAdded(serde_json::from_value(data)?),
            "user_typing" => {
                let p: Typing = serde_json::from_value(data)?;
                Self::UserTyping {
                    chat_id: p.chat_id,
                    user: p.user,
                }
            }
            "user_stop_typing" => {
                let p: ChatUser = serde_json::from_value(data)?;
                Self::UserStopTyping {
                    chat_id: p.chat_id,
                    user_id: p.user_id,
                }
            }
            "user_left_group" => {
                let p: ChatUser = serde_json::from_value(data)?;
                Self::UserLeftGroup {
                    chat_id: p.chat_id,
                    user_id: p.user_id,
                    message: p.message,
                }
            }
            "left_group" => {
                let p: ChatRef = serde_json::from_value(data)?;
                Self::LeftGroup { chat_id: p.chat_id }
            }
            "user_profile_updated" => Self::UserProfileUpdated(serde_json::from_value(data)?),
            "error" => {
                let p: ErrorPayload = serde_json::from_value(data)?;
                Self::Error { message: p.message }
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

// ---------------------------------------------------------------------------
// Outbound events
// ---------------------------------------------------------------------------

/// Typed outbound emits. Single-value payloads go on the wire as bare JSON
/// strings, mirroring the server's expectations.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Authenticate { token: String },
    GetPrivateChat { recipient_id: UserId },
    CreateGroup(CreateGroup),
    SendMessage {
        chat_id: ChatId,
        content: String,
        kind: MessageKind,
    },
    AddFriend { name: String },
    MarkMessagesRead { chat_id: ChatId },
    TypingStart { chat_id: ChatId },
    TypingStop { chat_id: ChatId },
    LeaveGroup { chat_id: ChatId },
    UpdateProfile(UpdateProfile),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessagePayload<'a> {
    chat_id: &'a ChatId,
    content: &'a str,
    #[serde(rename = "type")]
    kind: MessageKind,
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "authenticate",
            Self::GetPrivateChat { .. } => "get_private_chat",
            Self::CreateGroup(_) => "create_group",
            Self::SendMessage { .. } => "send_message",
            Self::AddFriend { .. } => "add_friend",
            Self::MarkMessagesRead { .. } => "mark_messages_read",
            Self::TypingStart { .. } => "typing_start",
            Self::TypingStop { .. } => "typing_stop",
            Self::LeaveGroup { .. } => "leave_group",
            Self::UpdateProfile(_) => "update_profile",
        }
    }

    pub fn to_frame(&self, ack_id: Option<u64>) -> serde_json::Result<Frame> {
        let data = match self {
            Self::Authenticate { token } => serde_json::json!({ "token": token }),
            Self::GetPrivateChat { recipient_id } => Value::String(recipient_id.0.clone()),
            Self::CreateGroup(group) => serde_json::to_value(group)?,
            Self::SendMessage {
                chat_id,
                content,
                kind,
            } => serde_json::to_value(SendMessagePayload {
                chat_id,
                content,
                kind: *kind,
            })?,
            Self::AddFriend { name } => Value::String(name.clone()),
            Self::MarkMessagesRead { chat_id }
            | Self::TypingStart { chat_id }
            | Self::TypingStop { chat_id }
            | Self::LeaveGroup { chat_id } => Value::String(chat_id.0.clone()),
            Self::UpdateProfile(update) => serde_json::to_value(update)?,
        };
        Ok(Frame {
            event: self.name().to_string(),
            ack_id,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trip() {
        let frame = Frame {
            event: "add_friend".into(),
            ack_id: Some(7),
            data: Value::String("bob".into()),
        };
        let text = frame.encode().unwrap();
        assert!(text.contains("\"ackId\":7"));
        assert_eq!(Frame::decode(&text).unwrap(), frame);
    }

    #[test]
    fn frame_omits_null_data() {
        let frame = Frame::new("connected", Value::Null);
        let text = frame.encode().unwrap();
        assert_eq!(text, "{\"event\":\"connected\"}");
        let back = Frame::decode(&text).unwrap();
        assert!(back.data.is_null());
    }

    #[test]
    fn send_message_payload_shape() {
        let ev = ClientEvent::SendMessage {
            chat_id: ChatId::new("c1"),
            content: "hi".into(),
            kind: MessageKind::Text,
        };
        let frame = ev.to_frame(None).unwrap();
        assert_eq!(frame.event, "send_message");
        assert_eq!(frame.data["chatId"], "c1");
        assert_eq!(frame.data["content"], "hi");
        assert_eq!(frame.data["type"], "text");
    }

    #[test]
    fn bare_string_payloads() {
        let ev = ClientEvent::MarkMessagesRead {
            chat_id: ChatId::new("c1"),
        };
        let frame = ev.to_frame(None).unwrap();
        assert_eq!(frame.data, Value::String("c1".into()));

        let ev = ClientEvent::GetPrivateChat {
            recipient_id: UserId::new("u2"),
        };
        assert_eq!(ev.to_frame(None).unwrap().data, Value::String("u2".into()));
    }

    #[test]
    fn decodes_new_message_event() {
        let text = r#"{"event":"new_message","data":{
            "id":"m1","senderId":"a","chatId":"c1","content":"hi",
            "timestamp":"2024-05-01T12:00:00Z","type":"text","readBy":[]
        }}"#;
        let frame = Frame::decode(text).unwrap();
        match ServerEvent::from_frame(frame).unwrap() {
            Some(ServerEvent::NewMessage(msg)) => {
                assert_eq!(msg.content, "hi");
                assert_eq!(msg.chat_id, ChatId::new("c1"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_events_are_skipped() {
        let frame = Frame::new("server_metrics", serde_json::json!({"load": 1}));
        assert!(ServerEvent::from_frame(frame).unwrap().is_none());
    }

    #[test]
    fn decodes_error_event() {
        let frame = Frame::new("error", serde_json::json!({"message": "boom"}));
        match ServerEvent::from_frame(frame).unwrap() {
            Some(ServerEvent::Error { message }) => assert_eq!(message, "boom"),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
