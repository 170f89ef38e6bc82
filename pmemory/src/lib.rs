//! Durable conversation history for the exchange orchestrator.
//!
//! ```rust
//! use pmemory::{HistoryBackendConfig, create_history_store};
//!
//! let store = create_history_store(HistoryBackendConfig::InMemory);
//! assert!(store.is_ok());
//! ```

mod backend;
mod backends;
mod error;

pub mod prelude {
    pub use crate::{
        HistoryBackendConfig, MemoryError, MemoryErrorKind, SqliteHistoryStore,
        create_default_history_store, create_history_store,
    };
}

pub use backend::{
    HistoryBackendConfig, SqliteHistoryStore, create_default_history_store, create_history_store,
};
pub use error::{MemoryError, MemoryErrorKind};
