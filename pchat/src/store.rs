//! Append-only conversation log contract and an in-memory implementation.
//!
//! ```rust
//! use futures_util::FutureExt;
//! use pchat::{ConversationTurn, HistoryStore, InMemoryHistoryStore};
//! use pcommon::UserId;
//!
//! let store = InMemoryHistoryStore::new();
//! let user = UserId::from("u1");
//! for text in ["one", "two"] {
//!     let appended = store.append(ConversationTurn::human(user.clone(), text)).now_or_never();
//!     assert!(matches!(appended, Some(Ok(()))));
//! }
//!
//! let window = store.load(&user, 1).now_or_never().and_then(Result::ok).unwrap_or_default();
//! assert_eq!(window[0].content, "two");
//! ```

use std::collections::HashMap;
use std::sync::Mutex;

use pcommon::{BoxFuture, UserId};

use crate::{ChatError, ConversationTurn};

pub type ChatFuture<'a, T> = BoxFuture<'a, T>;

pub trait HistoryStore: Send + Sync {
    fn append<'a>(&'a self, turn: ConversationTurn) -> ChatFuture<'a, Result<(), ChatError>>;

    /// The most recent `window` turns for `user_id`, oldest first.
    fn load<'a>(
        &'a self,
        user_id: &'a UserId,
        window: usize,
    ) -> ChatFuture<'a, Result<Vec<ConversationTurn>, ChatError>>;

    fn clear<'a>(&'a self, user_id: &'a UserId) -> ChatFuture<'a, Result<(), ChatError>>;
}

#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    turns: Mutex<HashMap<UserId, Vec<ConversationTurn>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored turn for `user_id`, ignoring any window.
    pub fn snapshot(&self, user_id: &UserId) -> Result<Vec<ConversationTurn>, ChatError> {
        let turns = self
            .turns
            .lock()
            .map_err(|_| ChatError::storage("history store lock poisoned"))?;

        Ok(turns.get(user_id).cloned().unwrap_or_default())
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn append<'a>(&'a self, turn: ConversationTurn) -> ChatFuture<'a, Result<(), ChatError>> {
        Box::pin(async move {
            let mut turns = self
                .turns
                .lock()
                .map_err(|_| ChatError::storage("history store lock poisoned"))?;

            turns.entry(turn.user_id.clone()).or_default().push(turn);
            Ok(())
        })
    }

    fn load<'a>(
        &'a self,
        user_id: &'a UserId,
        window: usize,
    ) -> ChatFuture<'a, Result<Vec<ConversationTurn>, ChatError>> {
        Box::pin(async move {
            let turns = self
                .turns
                .lock()
                .map_err(|_| ChatError::storage("history store lock poisoned"))?;

            let Some(user_turns) = turns.get(user_id) else {
                return Ok(Vec::new());
            };
            let start = user_turns.len().saturating_sub(window);
            Ok(user_turns[start..].to_vec())
        })
    }

    fn clear<'a>(&'a self, user_id: &'a UserId) -> ChatFuture<'a, Result<(), ChatError>> {
        Box::pin(async move {
            self.turns
                .lock()
                .map_err(|_| ChatError::storage("history store lock poisoned"))?
                .remove(user_id);
            Ok(())
        })
    }
}
