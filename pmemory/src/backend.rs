//! History backend selection.

use std::path::PathBuf;
use std::sync::Arc;

use pchat::{HistoryStore, InMemoryHistoryStore};
use serde::{Deserialize, Serialize};

use crate::backends::sqlite::default_history_path;
use crate::error::MemoryError;

pub use crate::backends::sqlite::SqliteHistoryStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum HistoryBackendConfig {
    Sqlite { path: PathBuf },
    InMemory,
}

impl Default for HistoryBackendConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: default_history_path(),
        }
    }
}

pub fn create_history_store(
    config: HistoryBackendConfig,
) -> Result<Arc<dyn HistoryStore>, MemoryError> {
    match config {
        HistoryBackendConfig::Sqlite { path } => {
            tracing::debug!(path = %path.display(), "opening sqlite history store");
            Ok(Arc::new(SqliteHistoryStore::new(path)?))
        }
        HistoryBackendConfig::InMemory => Ok(Arc::new(InMemoryHistoryStore::new())),
    }
}

pub fn create_default_history_store() -> Result<Arc<dyn HistoryStore>, MemoryError> {
    create_history_store(HistoryBackendConfig::default())
}
