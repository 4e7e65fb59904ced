//! Typed accessors over the key-value table.
//!
//! Complex values (the current user snapshot and the user-info cache) cross
//! the persistence boundary as JSON. The user-info cache is serialized as an
//! ordered list of `[id, user]` pairs and rebuilt into a map on load;
//! [`serialize_user_cache`] / [`deserialize_user_cache`] are the single
//! explicit boundary for that representation.

use std::collections::HashMap;

use causerie_shared::{ChatId, User, UserId};

use crate::database::SessionStore;
use crate::error::Result;

const KEY_TOKEN: &str = "token";
const KEY_USER: &str = "user";
const KEY_LAST_CHAT: &str = "last_active_chat_id";
const KEY_USER_CACHE: &str = "user_info_cache";

impl SessionStore {
    // -- bearer token --------------------------------------------------------

    pub fn token(&self) -> Result<Option<String>> {
        self.get_raw(KEY_TOKEN)
    }

    pub fn set_token(&self, token: &str) -> Result<()> {
        self.set_raw(KEY_TOKEN, token)
    }

    pub fn clear_token(&self) -> Result<()> {
        self.delete_raw(KEY_TOKEN)
    }

    // -- current user snapshot ----------------------------------------------

    /// The persisted current-user record, or `None` when absent or corrupted.
    /// Corrupted JSON is deleted on read.
    pub fn user(&self) -> Result<Option<User>> {
        let Some(raw) = self.get_raw(KEY_USER)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                tracing::warn!(error = %e, "discarding corrupted user record");
                self.delete_raw(KEY_USER)?;
                Ok(None)
            }
        }
    }

    pub fn set_user(&self, user: &User) -> Result<()> {
        self.set_raw(KEY_USER, &serde_json::to_string(user)?)
    }

    pub fn clear_user(&self) -> Result<()> {
        self.delete_raw(KEY_USER)
    }

    // -- last active chat ----------------------------------------------------

    pub fn last_chat_id(&self) -> Result<Option<ChatId>> {
        Ok(self.get_raw(KEY_LAST_CHAT)?.map(ChatId::new))
    }

    pub fn set_last_chat_id(&self, chat_id: &ChatId) -> Result<()> {
        self.set_raw(KEY_LAST_CHAT, chat_id.as_str())
    }

    pub fn clear_last_chat_id(&self) -> Result<()> {
        self.delete_raw(KEY_LAST_CHAT)
    }

    // -- user-info cache -----------------------------------------------------

    /// The persisted user-info cache. Corrupted payloads are discarded and
    /// yield an empty map.
    pub fn user_cache(&self) -> Result<HashMap<UserId, User>> {
        let Some(raw) = self.get_raw(KEY_USER_CACHE)? else {
            return Ok(HashMap::new());
        };
        match deserialize_user_cache(&raw) {
            Some(cache) => Ok(cache),
            None => {
                tracing::warn!("discarding corrupted user-info cache");
                self.delete_raw(KEY_USER_CACHE)?;
                Ok(HashMap::new())
            }
        }
    }

    pub fn set_user_cache(&self, cache: &HashMap<UserId, User>) -> Result<()> {
        self.set_raw(KEY_USER_CACHE, &serialize_user_cache(cache)?)
    }

    // -- session teardown ----------------------------------------------------

    /// Remove everything tied to the authenticated session. The user-info
    /// cache survives logout deliberately.
    pub fn clear_auth(&self) -> Result<()> {
        self.clear_token()?;
        self.clear_user()?;
        self.clear_last_chat_id()?;
        Ok(())
    }
}

/// Serialize the cache as an ordered `[[id, user], ...]` list. Entries are
/// sorted by id so the stored text is deterministic.
pub fn serialize_user_cache(cache: &HashMap<UserId, User>) -> serde_json::Result<String> {
    let mut pairs: Vec<(&UserId, &User)> = cache.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    serde_json::to_string(&pairs)
}

/// Rebuild the map from the stored pair list. Returns `None` on malformed
/// input; the caller decides whether to discard.
pub fn deserialize_user_cache(raw: &str) -> Option<HashMap<UserId, User>> {
    let pairs: Vec<(UserId, User)> = serde_json::from_str(raw).ok()?;
    Some(pairs.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(id: &str, name: &str) -> User {
        User {
            id: UserId::new(id),
            username: name.to_string(),
            display_name: name.to_string(),
            email: None,
            avatar: None,
            status: causerie_shared::UserStatus::Offline,
            last_seen: Utc::now(),
            joined_at: Utc::now(),
        }
    }

    #[test]
    fn token_and_user_round_trip() {
        let store = SessionStore::open_in_memory().unwrap();
        store.set_token("jwt-abc").unwrap();
        store.set_user(&user("u1", "ada")).unwrap();

        assert_eq!(store.token().unwrap().as_deref(), Some("jwt-abc"));
        assert_eq!(store.user().unwrap().unwrap().username, "ada");
    }

    #[test]
    fn corrupted_user_record_is_discarded() {
        let store = SessionStore::open_in_memory().unwrap();
        store.set_raw("user", "{not json").unwrap();
        assert!(store.user().unwrap().is_none());
        assert_eq!(store.get_raw("user").unwrap(), None);
    }

    #[test]
    fn user_cache_round_trip_is_equivalent() {
        let store = SessionStore::open_in_memory().unwrap();
        let mut cache = HashMap::new();
        cache.insert(UserId::new("u2"), user("u2", "bob"));
        cache.insert(UserId::new("u1"), user("u1", "ada"));

        store.set_user_cache(&cache).unwrap();
        let reloaded = store.user_cache().unwrap();

        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded, cache);
    }

    #[test]
    fn cache_serialization_is_deterministic() {
        let mut cache = HashMap::new();
        cache.insert(UserId::new("b"), user("b", "bob"));
        cache.insert(UserId::new("a"), user("a", "ada"));

        let first = serialize_user_cache(&cache).unwrap();
        let second = serialize_user_cache(&cache).unwrap();
        assert_eq!(first, second);
        // Sorted by id, so "a" leads.
        assert!(first.find("\"a\"").unwrap() < first.find("\"b\"").unwrap());
    }

    #[test]
    fn corrupted_cache_yields_empty_map() {
        let store = SessionStore::open_in_memory().unwrap();
        store.set_raw("user_info_cache", "[[broken").unwrap();
        assert!(store.user_cache().unwrap().is_empty());
    }

    #[test]
    fn clear_auth_preserves_user_cache() {
        let store = SessionStore::open_in_memory().unwrap();
        store.set_token("jwt").unwrap();
        store.set_user(&user("u1", "ada")).unwrap();
        store.set_last_chat_id(&ChatId::new("c1")).unwrap();
        let mut cache = HashMap::new();
        cache.insert(UserId::new("u2"), user("u2", "bob"));
        store.set_user_cache(&cache).unwrap();

        store.clear_auth().unwrap();

        assert!(store.token().unwrap().is_none());
        assert!(store.user().unwrap().is_none());
        assert!(store.last_chat_id().unwrap().is_none());
        assert_eq!(store.user_cache().unwrap(), cache);
    }
}
