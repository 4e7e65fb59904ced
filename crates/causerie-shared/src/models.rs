//! Domain model structs exchanged with the server.
//!
//! Field names follow the server's JSON (`camelCase`); timestamps are RFC 3339
//! strings parsed into `chrono` types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ChatId, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// Presence status reported by the server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Online,
    Offline,
    Away,
}

/// A registered user account.
///
/// Created at registration, mutated by profile updates, never deleted.
/// `username` is unique and doubles as the human-facing "add friend" key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub status: UserStatus,
    pub last_seen: DateTime<Utc>,
    pub joined_at: DateTime<Utc>,
}

/// Presence-shaped projection of a [`User`] carried on the live roster.
///
/// Exists only while a session is connected; the roster is replaced wholesale
/// on every presence snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SocketUser {
    pub id: UserId,
    pub username: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub status: UserStatus,
    #[serde(default)]
    pub socket_id: String,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Private,
    Group,
}

/// A conversation. Private chats have exactly two participants; groups carry
/// a name and an admin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: ChatId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(rename = "type")]
    pub kind: ChatKind,
    pub participants: Vec<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<Message>,
    /// Per-user count of messages not yet acknowledged as read.
    #[serde(default)]
    pub unread_counts: HashMap<UserId, u32>,
}

impl Chat {
    pub fn is_private(&self) -> bool {
        self.kind == ChatKind::Private
    }

    /// The other participant of a private chat, from `me`'s point of view.
    pub fn other_participant(&self, me: &UserId) -> Option<&UserId> {
        if !self.is_private() {
            return None;
        }
        self.participants.iter().find(|p| *p != me)
    }

    /// Order-insensitive equality of private pairings: two private chats with
    /// the same participant set are the same conversation.
    pub fn same_private_pair(&self, other: &Chat) -> bool {
        self.is_private()
            && other.is_private()
            && self.participants.len() == other.participants.len()
            && self
                .participants
                .iter()
                .all(|p| other.participants.contains(p))
    }

    pub fn unread_for(&self, user: &UserId) -> u32 {
        self.unread_counts.get(user).copied().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Emoji,
    System,
}

impl Default for MessageKind {
    fn default() -> Self {
        Self::Text
    }
}

/// A chat message. Immutable once created except for `read_by`, which grows
/// monotonically as read receipts arrive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: UserId,
    pub chat_id: ChatId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub read_by: Vec<UserId>,
    #[serde(default)]
    pub is_edited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Typing indicator
// ---------------------------------------------------------------------------

/// Ephemeral typing indicator. Lives between a typing-start and typing-stop
/// for a given (chat, user) pair; at most one entry per pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypingUser {
    pub user_id: UserId,
    pub username: String,
    #[serde(default)]
    pub is_typing: bool,
    pub last_typing_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<ChatId>,
}

// ---------------------------------------------------------------------------
// Request / response payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub display_name: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// `{user, token}` pair returned by login and registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

/// Partial profile update; only the set fields are sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroup {
    pub name: String,
    pub participant_ids: Vec<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn private_chat(id: &str, a: &str, b: &str) -> Chat {
        Chat {
            id: ChatId::new(id),
            name: None,
            avatar: None,
            kind: ChatKind::Private,
            participants: vec![UserId::new(a), UserId::new(b)],
            admin_id: None,
            created_at: Utc::now(),
            last_message: None,
            unread_counts: HashMap::new(),
        }
    }

    #[test]
    fn private_pair_equality_ignores_order() {
        let c1 = private_chat("c1", "a", "b");
        let c2 = private_chat("c2", "b", "a");
        assert!(c1.same_private_pair(&c2));
    }

    #[test]
    fn private_pair_differs_on_participants() {
        let c1 = private_chat("c1", "a", "b");
        let c2 = private_chat("c2", "a", "c");
        assert!(!c1.same_private_pair(&c2));
    }

    #[test]
    fn group_chats_never_match_as_pairs() {
        let mut g = private_chat("g1", "a", "b");
        g.kind = ChatKind::Group;
        let c = private_chat("c1", "a", "b");
        assert!(!g.same_private_pair(&c));
        assert!(!c.same_private_pair(&g));
    }

    #[test]
    fn chat_deserializes_server_json() {
        let json = r#"{
            "id": "c1",
            "type": "private",
            "participants": ["a", "b"],
            "createdAt": "2024-05-01T12:00:00Z",
            "unreadCounts": {"a": 2}
        }"#;
        let chat: Chat = serde_json::from_str(json).unwrap();
        assert_eq!(chat.kind, ChatKind::Private);
        assert_eq!(chat.unread_for(&UserId::new("a")), 2);
        assert_eq!(chat.unread_for(&UserId::new("b")), 0);
        assert_eq!(
            chat.other_participant(&UserId::new("a")),
            Some(&UserId::new("b"))
        );
    }

    #[test]
    fn message_defaults_missing_fields() {
        let json = r#"{
            "id": "m1",
            "senderId": "a",
            "chatId": "c1",
            "content": "hi",
            "timestamp": "2024-05-01T12:00:00Z"
        }"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.kind, MessageKind::Text);
        assert!(msg.read_by.is_empty());
        assert!(!msg.is_edited);
    }
}
