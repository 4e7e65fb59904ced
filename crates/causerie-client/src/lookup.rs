//! Background reconciliation of unknown user ids.
//!
//! Chats and messages reference users by id; participants who are offline and
//! were never cached render as truncated ids until their records are fetched.
//! The lookup task wakes when new ids may have appeared, waits briefly so a
//! burst of events coalesces into one sweep, then fetches each missing record
//! over REST and merges the results into the durable cache.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use causerie_api::ApiError;
use causerie_shared::{User, UserId};

use crate::session::SessionInner;
use crate::state::{merge_users_into_cache, ChatState};

/// Settle time after a wake-up before sweeping.
const DEBOUNCE: Duration = Duration::from_millis(400);

#[derive(Default)]
pub(crate) struct LookupState {
    notify: Notify,
    /// Ids currently being fetched; prevents duplicate requests across sweeps.
    pending: Mutex<HashSet<UserId>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LookupState {
    /// Wake the sweep task. Cheap and callable from under the state lock.
    pub(crate) fn poke(&self) {
        self.notify.notify_one();
    }

    fn pending(&self) -> MutexGuard<'_, HashSet<UserId>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn abort_task(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = task.take() {
            task.abort();
        }
        self.pending().clear();
    }
}

/// Spawn the sweep task if it is not already running. Called on the first
/// successful connect so construction stays runtime-free.
pub(crate) fn ensure_task(inner: &Arc<SessionInner>) {
    let mut slot = inner
        .lookup
        .task
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if slot.as_ref().is_some_and(|t| !t.is_finished()) {
        return;
    }
    let inner = Arc::clone(inner);
    *slot = Some(tokio::spawn(async move {
        loop {
            inner.lookup.notify.notified().await;
            tokio::time::sleep(DEBOUNCE).await;
            if sweep(&inner).await == SweepOutcome::Unauthorized {
                warn!("session invalidated by the server, signing out");
                inner.lookup.pending().clear();
                inner.force_sign_out();
                return;
            }
        }
    }));
}

#[derive(Debug, PartialEq)]
enum SweepOutcome {
    Done,
    /// The server answered 401; the session must be torn down and the sweep
    /// task has nothing left to do.
    Unauthorized,
}

async fn sweep(inner: &Arc<SessionInner>) -> SweepOutcome {
    let missing: Vec<UserId> = {
        let state = inner.state_guard();
        let mut pending = inner.lookup.pending();
        let missing = collect_missing(&state, &pending);
        pending.extend(missing.iter().cloned());
        missing
    };
    if missing.is_empty() {
        return SweepOutcome::Done;
    }
    debug!(count = missing.len(), "fetching unknown user records");

    let mut outcome = SweepOutcome::Done;
    let mut fetched: Vec<User> = Vec::with_capacity(missing.len());
    for id in &missing {
        match inner.api.user(id).await {
            Ok(user) => fetched.push(user),
            Err(ApiError::Unauthorized) => {
                outcome = SweepOutcome::Unauthorized;
                break;
            }
            // Leave it for a later sweep; the display falls back to the id.
            Err(e) => debug!(user = %id, error = %e, "user lookup failed"),
        }
    }

    let mut state = inner.state_guard();
    let changed = merge_users_into_cache(&mut state, fetched);
    if changed {
        if let Err(e) = inner.store.set_user_cache(&state.user_cache) {
            tracing::warn!(error = %e, "failed to persist user-info cache");
        }
    }
    let mut pending = inner.lookup.pending();
    for id in &missing {
        pending.remove(id);
    }
    drop(pending);
    trace!(changed, "lookup sweep done");
    outcome
}

/// Every user id referenced by the session that no source can resolve.
fn collect_missing(state: &ChatState, pending: &HashSet<UserId>) -> Vec<UserId> {
    let mut seen = HashSet::new();
    let mut missing = Vec::new();
    let mut consider = |id: &UserId| {
        if seen.insert(id.clone())
            && !pending.contains(id)
            && state.user_info(id).is_none()
        {
            missing.push(id.clone());
        }
    };

    for chat in &state.chats {
        for participant in &chat.participants {
            consider(participant);
        }
    }
    for message in &state.messages {
        consider(&message.sender_id);
    }
    missing
}
