//! Per-user mutual exclusion for whole exchanges.
//!
//! Entries are created lazily on first use and evicted as soon as nobody holds
//! or waits on them, so the map only ever contains users with an exchange in
//! flight.
//!
//! ```rust
//! use futures_util::FutureExt;
//! use pchat::ConversationLock;
//! use pcommon::UserId;
//!
//! let lock = ConversationLock::default();
//! let guard = lock.acquire(&UserId::from("u1")).now_or_never();
//! assert!(matches!(guard, Some(Ok(_))));
//! assert_eq!(lock.tracked_users(), 1);
//!
//! drop(guard);
//! assert_eq!(lock.tracked_users(), 0);
//! ```

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_timer::Delay;
use futures_util::future::{Either, select};
use pcommon::UserId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::{ChatError, LockPolicy};

type LockEntries = Arc<Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>>;

fn entries_of(entries: &LockEntries) -> MutexGuard<'_, HashMap<UserId, Arc<AsyncMutex<()>>>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drops the entry for `user_id` when the map holds the only reference.
///
/// Every clone of an entry is taken under the map mutex, so a count of one
/// observed under that mutex cannot race with a new acquirer.
fn evict_if_idle(entries: &mut HashMap<UserId, Arc<AsyncMutex<()>>>, user_id: &UserId) {
    if entries
        .get(user_id)
        .is_some_and(|entry| Arc::strong_count(entry) == 1)
    {
        entries.remove(user_id);
    }
}

#[derive(Clone, Default)]
pub struct ConversationLock {
    entries: LockEntries,
    policy: LockPolicy,
}

impl Debug for ConversationLock {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationLock")
            .field("tracked_users", &self.tracked_users())
            .field("policy", &self.policy)
            .finish()
    }
}

impl ConversationLock {
    pub fn new(policy: LockPolicy) -> Self {
        Self {
            entries: LockEntries::default(),
            policy,
        }
    }

    pub fn policy(&self) -> LockPolicy {
        self.policy
    }

    /// Waits until no other exchange for `user_id` is in flight.
    pub async fn acquire(&self, user_id: &UserId) -> Result<ConversationGuard, ChatError> {
        let entry = {
            let mut entries = entries_of(&self.entries);
            Arc::clone(entries.entry(user_id.clone()).or_default())
        };
        let pending = Box::pin(entry.lock_owned());

        let guard = match self.policy.acquire_timeout {
            None => pending.await,
            Some(limit) => match select(pending, Delay::new(limit)).await {
                Either::Left((guard, _)) => guard,
                Either::Right(((), pending)) => {
                    drop(pending);
                    evict_if_idle(&mut entries_of(&self.entries), user_id);
                    tracing::warn!(
                        phase = "lock",
                        event = "acquire_timeout",
                        user_id = %user_id,
                        timeout_ms = limit.as_millis() as u64,
                        "conversation lock acquisition timed out"
                    );
                    return Err(ChatError::lock_timeout(format!(
                        "another exchange for this user is still running after {} ms",
                        limit.as_millis()
                    )));
                }
            },
        };

        Ok(ConversationGuard {
            user_id: user_id.clone(),
            guard: Some(guard),
            entries: Arc::clone(&self.entries),
        })
    }

    pub fn release(&self, guard: ConversationGuard) {
        drop(guard);
    }

    /// Users that currently hold or wait for the lock.
    pub fn tracked_users(&self) -> usize {
        entries_of(&self.entries).len()
    }
}

/// Held for the duration of one exchange; dropping it releases the lock on
/// every exit path.
pub struct ConversationGuard {
    user_id: UserId,
    guard: Option<OwnedMutexGuard<()>>,
    entries: LockEntries,
}

impl ConversationGuard {
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn release(self) {}
}

impl Debug for ConversationGuard {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationGuard")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

impl Drop for ConversationGuard {
    fn drop(&mut self) {
        let mut entries = entries_of(&self.entries);
        drop(self.guard.take());
        evict_if_idle(&mut entries, &self.user_id);
    }
}
