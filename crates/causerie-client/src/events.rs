//! Inbound socket event application.
//!
//! [`apply_event`] turns each [`ServerEvent`] into reducer actions plus the
//! few side effects the event implies (persisting the cache, restoring the
//! last active chat, requesting private history). The pump task owns the
//! single event receiver and applies events strictly in delivery order, one
//! at a time under the state lock.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use causerie_net::SocketClient;
use causerie_shared::{Chat, ServerEvent};
use causerie_store::SessionStore;

use crate::session::SessionInner;
use crate::state::{
    merge_presence_into_cache, reduce, Action, ChatState,
};

/// Apply one inbound event. Returns whether the event may have introduced
/// user ids the cache has never seen, so the caller can wake the
/// reconciliation task.
pub(crate) fn apply_event(
    state: &mut ChatState,
    store: &SessionStore,
    socket: &SocketClient,
    event: ServerEvent,
) -> bool {
    match event {
        ServerEvent::ChatsLoaded(chats) => {
            reduce(state, Action::SetChats(chats));
            restore_last_chat(state, store, socket);
            true
        }

        ServerEvent::OnlineUsers(users) => {
            let changed = merge_presence_into_cache(state, &users);
            reduce(state, Action::SetOnlineUsers(users));
            if changed {
                persist_cache(state, store);
            }
            true
        }

        ServerEvent::UserStatusChanged { user_id, status } => {
            reduce(state, Action::UpdateUserStatus { user_id, status });
            false
        }

        ServerEvent::PrivateChatLoaded { chat, messages } => {
            reduce(state, Action::SetCurrentChat(Some(chat)));
            reduce(state, Action::SetMessages(messages));
            true
        }

        ServerEvent::GroupCreated(chat) => {
            reduce(state, Action::AddChat(chat));
            true
        }

        // Our own group creation: open it immediately, like any manual
        // chat selection.
        ServerEvent::GroupCreatedSuccess(chat) => {
            reduce(state, Action::AddChat(chat.clone()));
            if let Err(e) = store.set_last_chat_id(&chat.id) {
                warn!(error = %e, "failed to persist last chat id");
            }
            socket.mark_messages_read(&chat.id);
            reduce(state, Action::SetCurrentChat(Some(chat)));
            true
        }

        ServerEvent::NewMessage(message) => {
            reduce(state, Action::AddMessage(message));
            true
        }

        ServerEvent::MessagesRead { chat_id, user_id } => {
            reduce(state, Action::MarkMessagesRead { chat_id, user_id });
            false
        }

        ServerEvent::FriendAdded(added) => {
            reduce(state, Action::AddChat(added.chat));
            if let Some(message) = added.system_message {
                reduce(state, Action::AddMessage(message));
            }
            true
        }

        ServerEvent::UserTyping { chat_id, mut user } => {
            user.chat_id = Some(chat_id);
            reduce(state, Action::TypingStarted(user));
            false
        }

        ServerEvent::UserStopTyping { chat_id, user_id } => {
            reduce(state, Action::TypingStopped { chat_id, user_id });
            false
        }

        ServerEvent::UserLeftGroup {
            chat_id,
            user_id,
            message,
        } => {
            let is_self = state.user.as_ref().is_some_and(|u| u.id == user_id);
            if is_self {
                reduce(state, Action::RemoveChat(chat_id));
            } else {
                reduce(state, Action::UserLeftGroup { chat_id, user_id });
                if let Some(message) = message {
                    reduce(state, Action::AddMessage(message));
                }
            }
            false
        }

        ServerEvent::LeftGroup { chat_id } => {
            reduce(state, Action::RemoveChat(chat_id));
            false
        }

        ServerEvent::UserProfileUpdated(user) => {
            let changed = merge_presence_into_cache(state, std::slice::from_ref(&user));
            reduce(state, Action::ProfileUpdated(user));
            if changed {
                persist_cache(state, store);
            }
            false
        }

        ServerEvent::Error { message } => {
            warn!(message, "server pushed an error");
            reduce(state, Action::SetError(Some(message)));
            false
        }
    }
}

/// After a chat-list snapshot, reopen the chat that was active last session
/// and, for private chats, request its authoritative history.
fn restore_last_chat(state: &mut ChatState, store: &SessionStore, socket: &SocketClient) {
    let last = match store.last_chat_id() {
        Ok(Some(id)) => id,
        Ok(None) => return,
        Err(e) => {
            warn!(error = %e, "failed to read last chat id");
            return;
        }
    };

    let Some(chat) = state.chats.iter().find(|c| c.id == last).cloned() else {
        return;
    };

    debug!(chat = %chat.id, "restoring last active chat");
    // Same contract as a manual chat selection: the server learns the read
    // position while the local counter is zeroed.
    socket.mark_messages_read(&chat.id);
    request_private_history(state, socket, &chat);
    reduce(state, Action::SetCurrentChat(Some(chat)));
}

fn request_private_history(state: &ChatState, socket: &SocketClient, chat: &Chat) {
    if !chat.is_private() {
        return;
    }
    let Some(me) = state.user.as_ref().map(|u| &u.id) else {
        return;
    };
    if let Some(recipient) = chat.other_participant(me) {
        socket.get_private_chat(recipient);
    }
}

fn persist_cache(state: &ChatState, store: &SessionStore) {
    if let Err(e) = store.set_user_cache(&state.user_cache) {
        warn!(error = %e, "failed to persist user-info cache");
    }
}

/// Consume the connection's event stream until it ends (disconnect), then
/// mark the session offline.
pub(crate) fn spawn_event_pump(
    inner: Arc<SessionInner>,
    mut events: mpsc::UnboundedReceiver<ServerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let needs_lookup = {
                let mut state = inner.state_guard();
                apply_event(&mut state, &inner.store, &inner.socket, event)
            };
            if needs_lookup {
                inner.lookup.poke();
            }
        }
        debug!("event stream ended");
        let mut state = inner.state_guard();
        reduce(&mut state, Action::SetConnected(false));
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use causerie_net::SocketConfig;
    use causerie_shared::{ChatId, ChatKind, SocketUser, User, UserId, UserStatus};
    use chrono::Utc;
    use std::collections::HashMap;

    fn fixtures() -> (ChatState, SessionStore, SocketClient) {
        let store = SessionStore::open_in_memory().unwrap();
        let socket = SocketClient::new(SocketConfig::default());
        let mut state = ChatState::default();
        reduce(
            &mut state,
            Action::SetUser {
                user: User {
                    id: UserId::new("me"),
                    username: "me".into(),
                    display_name: "Me".into(),
                    email: None,
                    avatar: None,
                    status: UserStatus::Online,
                    last_seen: Utc::now(),
                    joined_at: Utc::now(),
                },
                token: "jwt".into(),
            },
        );
        (state, store, socket)
    }

    fn chat(id: &str, a: &str, b: &str) -> Chat {
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

    fn presence(id: &str) -> SocketUser {
        SocketUser {
            id: UserId::new(id),
            username: id.into(),
            display_name: format!("{id}!"),
            avatar: None,
            status: UserStatus::Online,
            socket_id: "s1".into(),
        }
    }

    #[test]
    fn error_event_fills_the_error_slot() {
        let (mut state, store, socket) = fixtures();
        apply_event(
            &mut state,
            &store,
            &socket,
            ServerEvent::Error {
                message: "boom".into(),
            },
        );
        assert_eq!(state.error.as_deref(), Some("boom"));
    }

    #[test]
    fn chats_loaded_restores_persisted_chat() {
        let (mut state, store, socket) = fixtures();
        store.set_last_chat_id(&ChatId::new("c2")).unwrap();

        apply_event(
            &mut state,
            &store,
            &socket,
            ServerEvent::ChatsLoaded(vec![chat("c1", "me", "a"), chat("c2", "me", "b")]),
        );

        assert_eq!(
            state.current_chat.as_ref().map(|c| c.id.clone()),
            Some(ChatId::new("c2"))
        );
    }

    #[test]
    fn restored_chat_has_its_unread_counter_zeroed() {
        let (mut state, store, socket) = fixtures();
        store.set_last_chat_id(&ChatId::new("c1")).unwrap();

        let mut stale = chat("c1", "me", "a");
        stale.unread_counts.insert(UserId::new("me"), 3);
        apply_event(&mut state, &store, &socket, ServerEvent::ChatsLoaded(vec![stale]));

        let me = UserId::new("me");
        assert_eq!(state.chats[0].unread_for(&me), 0);
        assert_eq!(
            state.current_chat.as_ref().map(|c| c.unread_for(&me)),
            Some(0)
        );
    }

    #[test]
    fn chats_loaded_without_persisted_chat_opens_nothing() {
        let (mut state, store, socket) = fixtures();
        apply_event(
            &mut state,
            &store,
            &socket,
            ServerEvent::ChatsLoaded(vec![chat("c1", "me", "a")]),
        );
        assert!(state.current_chat.is_none());
    }

    #[test]
    fn presence_snapshot_is_cached_and_persisted() {
        let (mut state, store, socket) = fixtures();

        apply_event(
            &mut state,
            &store,
            &socket,
            ServerEvent::OnlineUsers(vec![presence("b")]),
        );

        assert_eq!(state.online_users.len(), 1);
        assert_eq!(state.user_cache[&UserId::new("b")].display_name, "b!");
        // Durable copy written because the record was new.
        let persisted = store.user_cache().unwrap();
        assert_eq!(persisted[&UserId::new("b")].display_name, "b!");
    }

    #[test]
    fn own_departure_removes_chat_entirely() {
        let (mut state, store, socket) = fixtures();
        let mut g = chat("g1", "me", "b");
        g.kind = ChatKind::Group;
        reduce(&mut state, Action::SetChats(vec![g]));

        apply_event(
            &mut state,
            &store,
            &socket,
            ServerEvent::UserLeftGroup {
                chat_id: ChatId::new("g1"),
                user_id: UserId::new("me"),
                message: None,
            },
        );
        assert!(state.chats.is_empty());
    }

    #[test]
    fn peer_departure_prunes_participant() {
        let (mut state, store, socket) = fixtures();
        let mut g = chat("g1", "me", "b");
        g.kind = ChatKind::Group;
        reduce(&mut state, Action::SetChats(vec![g]));

        apply_event(
            &mut state,
            &store,
            &socket,
            ServerEvent::UserLeftGroup {
                chat_id: ChatId::new("g1"),
                user_id: UserId::new("b"),
                message: None,
            },
        );
        assert_eq!(state.chats.len(), 1);
        assert_eq!(state.chats[0].participants, vec![UserId::new("me")]);
    }

    #[test]
    fn private_chat_loaded_replaces_thread() {
        let (mut state, store, socket) = fixtures();
        reduce(&mut state, Action::SetChats(vec![chat("c1", "me", "b")]));

        apply_event(
            &mut state,
            &store,
            &socket,
            ServerEvent::PrivateChatLoaded {
                chat: chat("c1", "me", "b"),
                messages: vec![],
            },
        );
        assert!(state.messages.is_empty());
        assert!(state.current_chat.is_some());
    }
}
