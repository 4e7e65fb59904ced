//! Client-visible chat state and its reduction function.
//!
//! [`ChatState`] is the single authority for everything a view renders.
//! [`reduce`] applies one [`Action`] synchronously and deterministically;
//! two actions are never interleaved mid-reduction because the caller holds
//! the state lock for the duration of the call. The reducer performs no I/O,
//! which is what makes it unit-testable in isolation.

use std::collections::HashMap;

use chrono::Utc;
use tracing::trace;

use causerie_shared::{
    Chat, ChatId, Message, SocketUser, TypingUser, User, UserId, UserStatus,
};

/// The whole client-side session state.
#[derive(Debug, Clone, Default)]
pub struct ChatState {
    /// The authenticated user, `None` before login.
    pub user: Option<User>,
    /// Bearer token of the live session.
    pub token: Option<String>,
    /// Conversation list, most recently active first.
    pub chats: Vec<Chat>,
    /// The open conversation, if any.
    pub current_chat: Option<Chat>,
    /// Message thread of the open conversation only.
    pub messages: Vec<Message>,
    /// Live presence roster.
    pub online_users: Vec<SocketUser>,
    /// Live typing indicators, at most one per (chat, user) pair.
    pub typing_users: Vec<TypingUser>,
    /// Whether the real-time socket is up.
    pub connected: bool,
    /// Exclusive gate for in-flight logical operations.
    pub loading: bool,
    /// Single current-error slot, not a queue.
    pub error: Option<String>,
    /// Durable user-info cache; survives logout.
    pub user_cache: HashMap<UserId, User>,
}

/// Lightweight user view resolved by [`ChatState::user_info`]. The three
/// sources (self, roster, cache) have different record shapes; this is their
/// common displayable core.
#[derive(Debug, Clone, PartialEq)]
pub struct UserInfo {
    pub id: UserId,
    pub username: String,
    pub display_name: String,
    pub avatar: Option<String>,
}

impl From<&User> for UserInfo {
    fn from(u: &User) -> Self {
        Self {
            id: u.id.clone(),
            username: u.username.clone(),
            display_name: u.display_name.clone(),
            avatar: u.avatar.clone(),
        }
    }
}

impl From<&SocketUser> for UserInfo {
    fn from(u: &SocketUser) -> Self {
        Self {
            id: u.id.clone(),
            username: u.username.clone(),
            display_name: u.display_name.clone(),
            avatar: u.avatar.clone(),
        }
    }
}

impl ChatState {
    /// Resolve display info for a user id.
    ///
    /// Resolution order is fixed: self, then the live roster, then the
    /// durable cache. Callers fall back to [`UserId::short`] when this
    /// returns `None`.
    pub fn user_info(&self, id: &UserId) -> Option<UserInfo> {
        if let Some(me) = &self.user {
            if me.id == *id {
                return Some(UserInfo::from(me));
            }
        }
        if let Some(online) = self.online_users.iter().find(|u| u.id == *id) {
            return Some(UserInfo::from(online));
        }
        self.user_cache.get(id).map(UserInfo::from)
    }

    /// `user_info` with the truncated-id fallback applied.
    pub fn display_label(&self, id: &UserId) -> String {
        self.user_info(id)
            .map(|u| u.display_name)
            .unwrap_or_else(|| id.short())
    }

    fn current_chat_id(&self) -> Option<&ChatId> {
        self.current_chat.as_ref().map(|c| &c.id)
    }
}

/// One deterministic state transition.
#[derive(Debug, Clone)]
pub enum Action {
    SetLoading(bool),
    SetError(Option<String>),
    SetUser { user: User, token: String },
    /// Reset everything session-scoped; the user-info cache survives.
    ClearUser,
    SetConnected(bool),
    SetChats(Vec<Chat>),
    /// Insert at the head unless the id or the private pairing already exists.
    AddChat(Chat),
    /// Open (or close) a chat: clears the thread and zeroes the current
    /// user's unread counter on that chat.
    SetCurrentChat(Option<Chat>),
    SetMessages(Vec<Message>),
    AddMessage(Message),
    SetOnlineUsers(Vec<SocketUser>),
    UpdateUserStatus { user_id: UserId, status: UserStatus },
    TypingStarted(TypingUser),
    TypingStopped { chat_id: ChatId, user_id: UserId },
    /// Read receipt: `user_id` has read everything in `chat_id`.
    MarkMessagesRead { chat_id: ChatId, user_id: UserId },
    /// A participant (not self) left a group chat.
    UserLeftGroup { chat_id: ChatId, user_id: UserId },
    RemoveChat(ChatId),
    /// Roster entry patched after a peer profile update.
    ProfileUpdated(SocketUser),
    /// Merge fetched user records into the durable cache.
    MergeUserInfo(Vec<User>),
}

/// Apply `action` to `state`. Pure with respect to I/O; the only ambient
/// input is the clock (never read here).
pub fn reduce(state: &mut ChatState, action: Action) {
    trace!(?action, "reduce");
    match action {
        Action::SetLoading(loading) => state.loading = loading,

        Action::SetError(error) => {
            state.error = error;
            state.loading = false;
        }

        Action::SetUser { user, token } => {
            state.user = Some(user);
            state.token = Some(token);
            state.loading = false;
            state.error = None;
        }

        Action::ClearUser => {
            let user_cache = std::mem::take(&mut state.user_cache);
            *state = ChatState {
                user_cache,
                ..ChatState::default()
            };
        }

        Action::SetConnected(connected) => state.connected = connected,

        Action::SetChats(chats) => state.chats = chats,

        Action::AddChat(chat) => {
            let duplicate = state.chats.iter().any(|existing| {
                existing.id == chat.id || existing.same_private_pair(&chat)
            });
            if !duplicate {
                state.chats.insert(0, chat);
            }
        }

        Action::SetCurrentChat(chat) => {
            state.messages.clear();
            match chat {
                Some(mut chat) => {
                    if let Some(me) = state.user.as_ref().map(|u| u.id.clone()) {
                        chat.unread_counts.insert(me.clone(), 0);
                        if let Some(entry) = state.chats.iter_mut().find(|c| c.id == chat.id) {
                            entry.unread_counts.insert(me, 0);
                        }
                    }
                    state.current_chat = Some(chat);
                }
                None => state.current_chat = None,
            }
        }

        Action::SetMessages(messages) => state.messages = messages,

        Action::AddMessage(message) => {
            let is_current = state.current_chat_id() == Some(&message.chat_id);

            if let Some(pos) = state.chats.iter().position(|c| c.id == message.chat_id) {
                let mut chat = state.chats.remove(pos);
                if !is_current {
                    for participant in &chat.participants {
                        if *participant != message.sender_id {
                            *chat.unread_counts.entry(participant.clone()).or_insert(0) += 1;
                        }
                    }
                }
                chat.last_message = Some(message.clone());
                state.chats.insert(0, chat);
            }

            if is_current {
                if let Some(current) = &mut state.current_chat {
                    current.last_message = Some(message.clone());
                }
                state.messages.push(message);
            }
        }

        Action::SetOnlineUsers(users) => state.online_users = users,

        Action::UpdateUserStatus { user_id, status } => match status {
            UserStatus::Offline => state.online_users.retain(|u| u.id != user_id),
            _ => {
                if let Some(user) = state.online_users.iter_mut().find(|u| u.id == user_id) {
                    user.status = status;
                }
            }
        },

        Action::TypingStarted(typing) => {
            state.typing_users.retain(|t| {
                !(t.user_id == typing.user_id && t.chat_id == typing.chat_id)
            });
            state.typing_users.push(typing);
        }

        Action::TypingStopped { chat_id, user_id } => {
            state.typing_users.retain(|t| {
                !(t.user_id == user_id && t.chat_id.as_ref() == Some(&chat_id))
            });
        }

        Action::MarkMessagesRead { chat_id, user_id } => {
            for message in &mut state.messages {
                if message.chat_id == chat_id && !message.read_by.contains(&user_id) {
                    message.read_by.push(user_id.clone());
                }
            }
            if let Some(chat) = state.chats.iter_mut().find(|c| c.id == chat_id) {
                chat.unread_counts.insert(user_id.clone(), 0);
            }
            if let Some(current) = &mut state.current_chat {
                if current.id == chat_id {
                    current.unread_counts.insert(user_id, 0);
                }
            }
        }

        Action::UserLeftGroup { chat_id, user_id } => {
            if let Some(chat) = state.chats.iter_mut().find(|c| c.id == chat_id) {
                chat.participants.retain(|p| *p != user_id);
            }
            if let Some(current) = &mut state.current_chat {
                if current.id == chat_id {
                    current.participants.retain(|p| *p != user_id);
                }
            }
        }

        Action::RemoveChat(chat_id) => {
            state.chats.retain(|c| c.id != chat_id);
            if state.current_chat_id() == Some(&chat_id) {
                state.current_chat = None;
                state.messages.clear();
            }
        }

        Action::ProfileUpdated(updated) => {
            if let Some(user) = state.online_users.iter_mut().find(|u| u.id == updated.id) {
                *user = updated;
            }
        }

        Action::MergeUserInfo(users) => {
            for user in users {
                state.user_cache.insert(user.id.clone(), user);
            }
        }
    }
}

/// Merge presence records into the durable cache.
///
/// Returns whether anything actually changed, so callers persist only when a
/// display name or avatar moved; presence broadcasts are frequent and must
/// not cause write churn.
pub(crate) fn merge_presence_into_cache(state: &mut ChatState, users: &[SocketUser]) -> bool {
    let mut changed = false;
    for user in users {
        let up_to_date = state.user_cache.get(&user.id).is_some_and(|cached| {
            cached.display_name == user.display_name && cached.avatar == user.avatar
        });
        if up_to_date {
            continue;
        }
        state
            .user_cache
            .insert(user.id.clone(), user_from_presence(user));
        changed = true;
    }
    changed
}

/// Merge full user records (REST lookups) into the durable cache. Same
/// change-detection contract as [`merge_presence_into_cache`].
pub(crate) fn merge_users_into_cache(state: &mut ChatState, users: Vec<User>) -> bool {
    let mut changed = false;
    for user in users {
        let up_to_date = state.user_cache.get(&user.id).is_some_and(|cached| {
            cached.display_name == user.display_name && cached.avatar == user.avatar
        });
        if !up_to_date {
            state.user_cache.insert(user.id.clone(), user);
            changed = true;
        }
    }
    changed
}

fn user_from_presence(user: &SocketUser) -> User {
    User {
        id: user.id.clone(),
        username: user.username.clone(),
        display_name: user.display_name.clone(),
        email: None,
        avatar: user.avatar.clone(),
        status: user.status,
        last_seen: Utc::now(),
        joined_at: Utc::now(),
    }
}
