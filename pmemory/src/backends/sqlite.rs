use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use pchat::{ChatError, ChatFuture, ConversationTurn, HistoryStore, TurnRole};
use pcommon::UserId;
use pprovider::ToolCall;
use rusqlite::{Connection, Row, params};

use crate::error::MemoryError;

/// Conversation log kept in a single SQLite file, one row per turn.
///
/// Row order within a user follows insertion order, which is also the order
/// the exchange loop appends turns in.
#[derive(Debug)]
pub struct SqliteHistoryStore {
    connection: Mutex<Connection>,
}

impl SqliteHistoryStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|error| {
                MemoryError::storage(format!(
                    "failed to create sqlite parent directory: {error}"
                ))
            })?;
        }

        let connection = Connection::open(path).map_err(|error| {
            MemoryError::storage(format!("failed to open sqlite database: {error}"))
        })?;
        Self::from_connection(connection)
    }

    pub fn new_in_memory() -> Result<Self, MemoryError> {
        let connection = Connection::open_in_memory().map_err(|error| {
            MemoryError::storage(format!("failed to open in-memory sqlite database: {error}"))
        })?;
        Self::from_connection(connection)
    }

    fn from_connection(connection: Connection) -> Result<Self, MemoryError> {
        connection
            .busy_timeout(Duration::from_secs(5))
            .map_err(|error| {
                MemoryError::storage(format!("failed to configure sqlite busy timeout: {error}"))
            })?;
        let store = Self {
            connection: Mutex::new(connection),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>, MemoryError> {
        self.connection
            .lock()
            .map_err(|_| MemoryError::storage("sqlite history lock poisoned"))
    }

    fn initialize_schema(&self) -> Result<(), MemoryError> {
        let conn = self.connection()?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;

            CREATE TABLE IF NOT EXISTS conversation_turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                turn_id TEXT NOT NULL UNIQUE,
                user_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                tool_call_id TEXT,
                tool_calls_json TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_conversation_turns_user_id
            ON conversation_turns(user_id, id);
            ",
        )
        .map_err(|error| {
            MemoryError::storage(format!("failed to initialize sqlite schema: {error}"))
        })?;

        Ok(())
    }

    /// Number of stored turns for `user_id`, regardless of any window.
    pub fn turn_count(&self, user_id: &UserId) -> Result<usize, MemoryError> {
        let conn = self.connection()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM conversation_turns WHERE user_id = ?1",
                params![user_id.as_str()],
                |row| row.get(0),
            )
            .map_err(|error| {
                MemoryError::storage(format!("failed to count conversation turns: {error}"))
            })?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn insert_turn(&self, turn: &ConversationTurn) -> Result<(), MemoryError> {
        let tool_calls_json = if turn.tool_calls.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&turn.tool_calls).map_err(|error| {
                MemoryError::invalid_request(format!("failed to serialize tool calls: {error}"))
            })?)
        };

        let conn = self.connection()?;
        conn.execute(
            "
            INSERT INTO conversation_turns (
                turn_id,
                user_id,
                role,
                content,
                tool_call_id,
                tool_calls_json,
                created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
            params![
                &turn.turn_id,
                turn.user_id.as_str(),
                turn.role.as_str(),
                &turn.content,
                turn.tool_call_id.as_deref(),
                tool_calls_json,
                turn.created_at.to_rfc3339(),
            ],
        )
        .map_err(|error| {
            MemoryError::storage(format!("failed to append conversation turn: {error}"))
        })?;

        Ok(())
    }

    fn select_window(
        &self,
        user_id: &UserId,
        window: usize,
    ) -> Result<Vec<ConversationTurn>, MemoryError> {
        if window == 0 {
            return Ok(Vec::new());
        }

        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "
                SELECT turn_id, role, content, tool_call_id, tool_calls_json, created_at
                FROM conversation_turns
                WHERE user_id = ?1
                ORDER BY id DESC
                LIMIT ?2
                ",
            )
            .map_err(|error| {
                MemoryError::storage(format!("failed to prepare history query: {error}"))
            })?;
        let limit = i64::try_from(window).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![user_id.as_str(), limit], StoredTurn::from_row)
            .map_err(|error| {
                MemoryError::storage(format!("failed to query history rows: {error}"))
            })?;

        let mut turns = Vec::new();
        for row in rows {
            let stored = row.map_err(|error| {
                MemoryError::storage(format!("failed to read history row: {error}"))
            })?;
            turns.push(stored.into_turn(user_id)?);
        }
        turns.reverse();
        Ok(turns)
    }

    fn delete_user(&self, user_id: &UserId) -> Result<(), MemoryError> {
        let conn = self.connection()?;
        conn.execute(
            "DELETE FROM conversation_turns WHERE user_id = ?1",
            params![user_id.as_str()],
        )
        .map_err(|error| {
            MemoryError::storage(format!("failed to clear conversation turns: {error}"))
        })?;
        Ok(())
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn append<'a>(&'a self, turn: ConversationTurn) -> ChatFuture<'a, Result<(), ChatError>> {
        Box::pin(async move { self.insert_turn(&turn).map_err(ChatError::from) })
    }

    fn load<'a>(
        &'a self,
        user_id: &'a UserId,
        window: usize,
    ) -> ChatFuture<'a, Result<Vec<ConversationTurn>, ChatError>> {
        Box::pin(async move { self.select_window(user_id, window).map_err(ChatError::from) })
    }

    fn clear<'a>(&'a self, user_id: &'a UserId) -> ChatFuture<'a, Result<(), ChatError>> {
        Box::pin(async move {
            self.delete_user(user_id)?;
            tracing::info!(phase = "history", user_id = %user_id, "conversation cleared");
            Ok(())
        })
    }
}

struct StoredTurn {
    turn_id: String,
    role: String,
    content: String,
    tool_call_id: Option<String>,
    tool_calls_json: Option<String>,
    created_at: String,
}

impl StoredTurn {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            turn_id: row.get(0)?,
            role: row.get(1)?,
            content: row.get(2)?,
            tool_call_id: row.get(3)?,
            tool_calls_json: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn into_turn(self, user_id: &UserId) -> Result<ConversationTurn, MemoryError> {
        let role = TurnRole::parse(&self.role).ok_or_else(|| {
            MemoryError::corrupt(format!("unknown conversation role value '{}'", self.role))
        })?;
        let tool_calls = match self.tool_calls_json.as_deref() {
            Some(raw) => serde_json::from_str::<Vec<ToolCall>>(raw).map_err(|error| {
                MemoryError::corrupt(format!(
                    "tool calls of turn '{}' are not valid json: {error}",
                    self.turn_id
                ))
            })?,
            None => Vec::new(),
        };
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|error| {
                MemoryError::corrupt(format!(
                    "timestamp of turn '{}' is not RFC 3339: {error}",
                    self.turn_id
                ))
            })?
            .with_timezone(&Utc);

        Ok(ConversationTurn {
            turn_id: self.turn_id,
            user_id: user_id.clone(),
            role,
            content: self.content,
            tool_call_id: self.tool_call_id,
            tool_calls,
            created_at,
        })
    }
}

pub(crate) fn default_history_path() -> PathBuf {
    if let Some(explicit) = std::env::var_os("PARLEY_HISTORY_PATH") {
        return PathBuf::from(explicit);
    }

    if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
        return PathBuf::from(home).join(".parley").join("history.sqlite3");
    }

    PathBuf::from("history.sqlite3")
}
