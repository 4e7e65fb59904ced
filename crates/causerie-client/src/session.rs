//! The session facade.
//!
//! [`ChatSession`] owns the state container, the persisted store, the REST
//! client, and the socket client, and exposes the logical operations a
//! front-end drives. All state changes funnel through [`reduce`] under one
//! lock; the socket's event pump and the user-lookup task share the same
//! [`SessionInner`] through an `Arc`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use causerie_api::{ApiClient, ApiError};
use causerie_net::{SocketClient, SocketConfig};
use causerie_shared::{
    AuthResponse, Chat, ChatId, CreateGroup, LoginRequest, MessageKind, RegisterRequest,
    SocketUser, UpdateProfile, User, UserId,
};
use causerie_store::SessionStore;

use crate::error::SessionError;
use crate::errors::{map_add_friend_error, map_register_error};
use crate::events::spawn_event_pump;
use crate::lookup::{self, LookupState};
use crate::state::{reduce, Action, ChatState, UserInfo};

/// Shown when the socket cannot be established; REST features keep working.
const CONNECT_FAILED: &str = "无法连接服务器，实时消息暂不可用";

/// Delay before refreshing the roster after a profile update, giving the
/// server time to propagate the change.
const PROFILE_REFRESH_DELAY: Duration = Duration::from_millis(1500);

/// Endpoints and timeouts for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub api_url: String,
    pub socket: SocketConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_url: causerie_api::DEFAULT_API_URL.to_string(),
            socket: SocketConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Read endpoints from `CAUSERIE_API_URL` and `CAUSERIE_SERVER_URL`,
    /// falling back to the local development defaults.
    pub fn from_env() -> Self {
        Self {
            api_url: std::env::var("CAUSERIE_API_URL")
                .unwrap_or_else(|_| causerie_api::DEFAULT_API_URL.to_string()),
            socket: SocketConfig::from_env(),
        }
    }
}

pub(crate) struct SessionInner {
    pub(crate) state: Mutex<ChatState>,
    pub(crate) store: Arc<SessionStore>,
    pub(crate) api: ApiClient,
    pub(crate) socket: SocketClient,
    pub(crate) lookup: LookupState,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl SessionInner {
    pub(crate) fn state_guard(&self) -> MutexGuard<'_, ChatState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the live connection and return to the unauthenticated state.
    /// Invoked on explicit logout and whenever the server answers 401; the
    /// persisted credentials are already gone by then (the REST layer clears
    /// them), so only the in-memory session remains to tear down.
    pub(crate) fn force_sign_out(&self) {
        self.socket.disconnect();
        let mut slot = self.pump.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pump) = slot.take() {
            pump.abort();
        }
        drop(slot);
        let mut state = self.state_guard();
        reduce(&mut state, Action::ClearUser);
    }
}

/// Handle to one client session. Cloning shares the session.
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<SessionInner>,
}

impl ChatSession {
    /// Open the default on-disk store and build a session around it. No
    /// network traffic and no task spawning happens here.
    pub fn new(config: SessionConfig) -> Result<Self, SessionError> {
        let store = Arc::new(SessionStore::open()?);
        Self::with_store(config, store)
    }

    /// Build a session over an explicit store. Used by tests with an
    /// in-memory store.
    pub fn with_store(config: SessionConfig, store: Arc<SessionStore>) -> Result<Self, SessionError> {
        let api = ApiClient::new(config.api_url, Arc::clone(&store))?;
        let socket = SocketClient::new(config.socket);

        let mut state = ChatState::default();
        state.user_cache = store.user_cache()?;
        debug!(cached = state.user_cache.len(), "loaded user-info cache");

        Ok(Self {
            inner: Arc::new(SessionInner {
                state: Mutex::new(state),
                store,
                api,
                socket,
                lookup: LookupState::default(),
                pump: Mutex::new(None),
            }),
        })
    }

    fn dispatch(&self, action: Action) {
        let mut state = self.inner.state_guard();
        reduce(&mut state, action);
    }

    /// A point-in-time copy of the whole state, for rendering.
    pub fn snapshot(&self) -> ChatState {
        self.inner.state_guard().clone()
    }

    pub fn clear_error(&self) {
        self.dispatch(Action::SetError(None));
    }

    fn current_user_id(&self) -> Option<UserId> {
        self.inner.state_guard().user.as_ref().map(|u| u.id.clone())
    }

    // -- authentication ------------------------------------------------------

    /// Sign in. On failure the error lands in the state's error slot and
    /// `false` is returned.
    pub async fn login(&self, username: &str, password: &str) -> bool {
        self.dispatch(Action::SetLoading(true));
        let request = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        match self.inner.api.login(&request).await {
            Ok(auth) => {
                self.complete_auth(auth).await;
                true
            }
            Err(e) => {
                self.dispatch(Action::SetError(Some(e.to_string())));
                false
            }
        }
    }

    /// Create an account and sign in. Duplicate-account failures are
    /// rephrased for the user.
    pub async fn register(&self, request: RegisterRequest) -> bool {
        self.dispatch(Action::SetLoading(true));
        match self.inner.api.register(&request).await {
            Ok(auth) => {
                self.complete_auth(auth).await;
                true
            }
            Err(e) => {
                self.dispatch(Action::SetError(Some(map_register_error(&e.to_string()))));
                false
            }
        }
    }

    async fn complete_auth(&self, auth: AuthResponse) {
        if let Err(e) = self.inner.store.set_token(&auth.token) {
            warn!(error = %e, "failed to persist token");
        }
        if let Err(e) = self.inner.store.set_user(&auth.user) {
            warn!(error = %e, "failed to persist user record");
        }
        info!(user = %auth.user.id, "authenticated");
        self.dispatch(Action::SetUser {
            user: auth.user,
            token: auth.token.clone(),
        });
        self.connect_socket(&auth.token).await;
    }

    /// Resume the persisted session, if any. Returns whether a session was
    /// restored; the socket connecting is attempted but not required.
    pub async fn restore_session(&self) -> bool {
        let (token, user) = match (self.inner.store.token(), self.inner.store.user()) {
            (Ok(Some(token)), Ok(Some(user))) => (token, user),
            (Ok(_), Ok(_)) => return false,
            (t, u) => {
                if let Err(e) = t.and(u) {
                    warn!(error = %e, "failed to read persisted session");
                }
                return false;
            }
        };

        info!(user = %user.id, "restoring persisted session");
        self.dispatch(Action::SetUser {
            user,
            token: token.clone(),
        });
        self.connect_socket(&token).await;
        self.seed_roster().await;
        true
    }

    /// One REST snapshot of who is online, so the roster is not empty while
    /// the socket's first broadcast is in flight.
    async fn seed_roster(&self) {
        match self.inner.api.online_users().await {
            Ok(users) => {
                let roster: Vec<SocketUser> = users.iter().map(presence_from_user).collect();
                self.dispatch(Action::SetOnlineUsers(roster));
            }
            Err(e) => {
                debug!(error = %e, "roster seed failed");
                self.handle_api_failure(&e);
            }
        }
    }

    async fn connect_socket(&self, token: &str) {
        self.inner.socket.initialize(token);
        match self.inner.socket.connect().await {
            Ok(Some(events)) => {
                lookup::ensure_task(&self.inner);
                let pump = spawn_event_pump(Arc::clone(&self.inner), events);
                let mut slot = self
                    .inner
                    .pump
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                if let Some(old) = slot.replace(pump) {
                    old.abort();
                }
                self.dispatch(Action::SetConnected(true));
            }
            Ok(None) => self.dispatch(Action::SetConnected(true)),
            Err(e) => {
                warn!(error = %e, "socket connect failed");
                self.dispatch(Action::SetError(Some(CONNECT_FAILED.to_string())));
            }
        }
    }

    /// Sign out. The persisted user-info cache survives; everything else
    /// session-scoped is dropped.
    pub fn logout(&self) {
        if let Err(e) = self.inner.store.clear_auth() {
            warn!(error = %e, "failed to clear persisted session");
        }
        self.reset_session_state();
        info!("signed out");
    }

    /// Tear down connections and reset in-memory state. Also invoked when the
    /// server invalidates our credentials.
    fn reset_session_state(&self) {
        self.inner.lookup.abort_task();
        self.inner.force_sign_out();
    }

    /// A 401 anywhere means the session is dead; everything else is the
    /// caller's business.
    fn handle_api_failure(&self, e: &ApiError) {
        if matches!(e, ApiError::Unauthorized) {
            warn!("session invalidated by the server, signing out");
            self.reset_session_state();
        }
    }

    // -- chat operations -----------------------------------------------------

    /// Open a chat (or close with `None`). Persists the selection, reports
    /// the read position to the server, and for private chats requests the
    /// authoritative thread.
    pub fn set_current_chat(&self, chat: Option<Chat>) {
        match chat {
            Some(chat) => {
                if let Err(e) = self.inner.store.set_last_chat_id(&chat.id) {
                    warn!(error = %e, "failed to persist last chat id");
                }
                self.inner.socket.mark_messages_read(&chat.id);
                if chat.is_private() {
                    if let Some(me) = self.current_user_id() {
                        if let Some(recipient) = chat.other_participant(&me) {
                            self.inner.socket.get_private_chat(recipient);
                        }
                    }
                }
                self.dispatch(Action::SetCurrentChat(Some(chat)));
            }
            None => {
                if let Err(e) = self.inner.store.clear_last_chat_id() {
                    warn!(error = %e, "failed to clear last chat id");
                }
                self.dispatch(Action::SetCurrentChat(None));
            }
        }
    }

    /// Send a message to a chat. Blank content is a no-op; the message lands
    /// in local state only when the server echoes it back.
    pub fn send_message(&self, chat_id: &ChatId, content: &str, kind: MessageKind) {
        let content = content.trim();
        if content.is_empty() {
            return;
        }
        self.inner.socket.send_message(chat_id, content, kind);
    }

    pub fn mark_messages_read(&self, chat_id: &ChatId) {
        self.inner.socket.mark_messages_read(chat_id);
    }

    pub fn create_group(&self, group: CreateGroup) {
        self.inner.socket.create_group(group);
    }

    pub fn leave_group(&self, chat_id: &ChatId) {
        self.inner.socket.leave_group(chat_id);
    }

    pub fn typing_start(&self, chat_id: &ChatId) {
        self.inner.socket.typing_start(chat_id);
    }

    pub fn typing_stop(&self, chat_id: &ChatId) {
        self.inner.socket.typing_stop(chat_id);
    }

    pub fn get_private_chat(&self, recipient_id: &UserId) {
        self.inner.socket.get_private_chat(recipient_id);
    }

    /// Add a friend by username. The new chat is applied on success; the
    /// server's rejection is rephrased and recorded on failure.
    pub async fn add_friend(&self, name: &str) -> Result<(), SessionError> {
        self.dispatch(Action::SetLoading(true));
        match self.inner.socket.add_friend(name).await {
            Ok(added) => {
                let mut state = self.inner.state_guard();
                reduce(&mut state, Action::AddChat(added.chat));
                if let Some(message) = added.system_message {
                    reduce(&mut state, Action::AddMessage(message));
                }
                reduce(&mut state, Action::SetLoading(false));
                drop(state);
                self.inner.lookup.poke();
                Ok(())
            }
            Err(e) => {
                self.dispatch(Action::SetError(Some(map_add_friend_error(&e.to_string()))));
                Err(e.into())
            }
        }
    }

    // -- profile -------------------------------------------------------------

    /// Update the signed-in user's profile over REST, then re-fetch the
    /// canonical record, persist it, and announce the change on the socket.
    pub async fn update_user_profile(&self, update: UpdateProfile) -> Result<User, SessionError> {
        let me = self.current_user_id().ok_or(SessionError::NotSignedIn)?;
        let token = {
            let state = self.inner.state_guard();
            state.token.clone().ok_or(SessionError::NotSignedIn)?
        };

        self.dispatch(Action::SetLoading(true));
        let result = async {
            self.inner.api.update_user(&me, &update).await?;
            self.inner.api.current_user().await
        }
        .await;

        let user = match result {
            Ok(user) => user,
            Err(e) => {
                self.handle_api_failure(&e);
                self.dispatch(Action::SetError(Some(e.to_string())));
                return Err(e.into());
            }
        };

        if let Err(e) = self.inner.store.set_user(&user) {
            warn!(error = %e, "failed to persist user record");
        }
        self.dispatch(Action::SetUser {
            user: user.clone(),
            token,
        });

        // Peers learn about it through the socket broadcast.
        self.inner.socket.update_profile(UpdateProfile {
            display_name: update.display_name,
            avatar: update.avatar,
            ..UpdateProfile::default()
        });

        let session = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(PROFILE_REFRESH_DELAY).await;
            session.seed_roster().await;
        });

        Ok(user)
    }

    // -- display helpers -----------------------------------------------------

    pub fn get_user_info(&self, id: &UserId) -> Option<UserInfo> {
        self.inner.state_guard().user_info(id)
    }

    pub fn display_label(&self, id: &UserId) -> String {
        self.inner.state_guard().display_label(id)
    }
}

/// REST user records carry no socket id; the roster shape is rebuilt with an
/// empty one and the status forced online, matching what the snapshot means.
fn presence_from_user(user: &User) -> SocketUser {
    SocketUser {
        id: user.id.clone(),
        username: user.username.clone(),
        display_name: user.display_name.clone(),
        avatar: user.avatar.clone(),
        status: causerie_shared::UserStatus::Online,
        socket_id: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use causerie_shared::UserStatus;
    use chrono::Utc;

    fn session() -> ChatSession {
        let store = Arc::new(SessionStore::open_in_memory().unwrap());
        ChatSession::with_store(SessionConfig::default(), store).unwrap()
    }

    fn user(id: &str) -> User {
        User {
            id: UserId::new(id),
            username: id.to_string(),
            display_name: format!("{id}-name"),
            email: None,
            avatar: None,
            status: UserStatus::Online,
            last_seen: Utc::now(),
            joined_at: Utc::now(),
        }
    }

    #[test]
    fn fresh_session_is_signed_out() {
        let session = session();
        let state = session.snapshot();
        assert!(state.user.is_none());
        assert!(!state.connected);
        assert!(state.chats.is_empty());
    }

    #[test]
    fn construction_loads_persisted_cache() {
        let store = Arc::new(SessionStore::open_in_memory().unwrap());
        let mut cache = std::collections::HashMap::new();
        cache.insert(UserId::new("b"), user("b"));
        store.set_user_cache(&cache).unwrap();

        let session = ChatSession::with_store(SessionConfig::default(), store).unwrap();
        assert_eq!(
            session.display_label(&UserId::new("b")),
            "b-name"
        );
    }

    #[test]
    fn blank_messages_are_not_sent() {
        let session = session();
        // Disconnected socket would drop these anyway; the point is that the
        // call is a clean no-op and never panics.
        session.send_message(&ChatId::new("c1"), "   ", MessageKind::Text);
        session.send_message(&ChatId::new("c1"), "", MessageKind::Text);
    }

    #[tokio::test]
    async fn restore_without_persisted_session_is_false() {
        let session = session();
        assert!(!session.restore_session().await);
        assert!(session.snapshot().user.is_none());
    }

    #[tokio::test]
    async fn logout_preserves_user_cache() {
        let store = Arc::new(SessionStore::open_in_memory().unwrap());
        store.set_token("jwt").unwrap();
        store.set_user(&user("me")).unwrap();
        let mut cache = std::collections::HashMap::new();
        cache.insert(UserId::new("b"), user("b"));
        store.set_user_cache(&cache).unwrap();

        let session =
            ChatSession::with_store(SessionConfig::default(), Arc::clone(&store)).unwrap();
        session.logout();

        assert!(store.token().unwrap().is_none());
        assert!(store.user().unwrap().is_none());
        let state = session.snapshot();
        assert!(state.user.is_none());
        assert!(state.user_cache.contains_key(&UserId::new("b")));
    }

    #[test]
    fn unauthorized_failure_signs_the_session_out() {
        let session = session();
        session.dispatch(Action::SetUser {
            user: user("me"),
            token: "jwt".into(),
        });
        session.dispatch(Action::MergeUserInfo(vec![user("b")]));

        // Ordinary server errors leave the session alone.
        session.handle_api_failure(&ApiError::Server {
            status: 500,
            message: "boom".into(),
        });
        assert!(session.snapshot().user.is_some());

        // A 401 tears it down; the user-info cache survives as on logout.
        session.handle_api_failure(&ApiError::Unauthorized);
        let state = session.snapshot();
        assert!(state.user.is_none());
        assert!(state.token.is_none());
        assert!(!state.connected);
        assert!(state.user_cache.contains_key(&UserId::new("b")));
    }

    #[tokio::test]
    async fn rejected_add_friend_leaves_chat_list_untouched() {
        let session = session();
        // No connection, so the call rejects before reaching the server.
        let result = session.add_friend("bob").await;
        assert!(result.is_err());

        let state = session.snapshot();
        assert!(state.chats.is_empty());
        assert!(state.error.is_some());
    }

    #[tokio::test]
    async fn profile_update_requires_sign_in() {
        let session = session();
        match session.update_user_profile(UpdateProfile::default()).await {
            Err(SessionError::NotSignedIn) => {}
            other => panic!("unexpected result: {:?}", other.map(|u| u.id)),
        }
    }

    #[test]
    fn clear_error_empties_the_slot() {
        let session = session();
        session.dispatch(Action::SetError(Some("boom".into())));
        assert!(session.snapshot().error.is_some());
        session.clear_error();
        assert!(session.snapshot().error.is_none());
    }
}
