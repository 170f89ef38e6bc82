use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use pcommon::{BoxFuture, UserId};
use pprovider::{ToolArguments, ToolDefinition};
use serde_json::json;

use crate::{
    Artifact, Tool, ToolError, ToolExecutionContext, ToolFuture, ToolOutput, required_string,
};

/// Business-rule failures of the notification store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    #[error("notification time is in the past")]
    InPast,
    #[error("notification time is beyond the scheduling horizon")]
    BeyondHorizon,
    #[error("active notification limit of {limit} reached")]
    LimitReached { limit: usize },
    #[error("notification storage failed: {0}")]
    Storage(String),
}

pub trait NotificationStore: Send + Sync {
    /// Stores a reminder and returns its id.
    fn add<'a>(
        &'a self,
        user_id: &'a UserId,
        when: DateTime<Utc>,
        text: &'a str,
    ) -> BoxFuture<'a, Result<String, NotificationError>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredNotification {
    id: String,
    when: DateTime<Utc>,
    text: String,
}

/// Process-local store enforcing the same rules as the production one.
#[derive(Debug)]
pub struct InMemoryNotificationStore {
    limit: usize,
    horizon: Duration,
    next_id: AtomicU64,
    entries: Mutex<HashMap<UserId, Vec<StoredNotification>>>,
}

impl Default for InMemoryNotificationStore {
    fn default() -> Self {
        Self::new(10, Duration::days(365))
    }
}

impl InMemoryNotificationStore {
    pub fn new(limit: usize, horizon: Duration) -> Self {
        Self {
            limit,
            horizon,
            next_id: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Notifications still due for `user_id`.
    pub fn active(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<(String, DateTime<Utc>, String)>, NotificationError> {
        let now = Utc::now();
        let entries = self
            .entries
            .lock()
            .map_err(|_| NotificationError::Storage("notification lock poisoned".to_string()))?;

        Ok(entries
            .get(user_id)
            .into_iter()
            .flatten()
            .filter(|entry| entry.when > now)
            .map(|entry| (entry.id.clone(), entry.when, entry.text.clone()))
            .collect())
    }

    fn insert(
        &self,
        user_id: &UserId,
        when: DateTime<Utc>,
        text: &str,
    ) -> Result<String, NotificationError> {
        let now = Utc::now();
        if when <= now {
            return Err(NotificationError::InPast);
        }
        if when > now + self.horizon {
            return Err(NotificationError::BeyondHorizon);
        }

        let mut entries = self
            .entries
            .lock()
            .map_err(|_| NotificationError::Storage("notification lock poisoned".to_string()))?;
        let user_entries = entries.entry(user_id.clone()).or_default();
        user_entries.retain(|entry| entry.when > now);
        if user_entries.len() >= self.limit {
            return Err(NotificationError::LimitReached { limit: self.limit });
        }

        let id = format!("ntf-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        user_entries.push(StoredNotification {
            id: id.clone(),
            when,
            text: text.to_string(),
        });
        Ok(id)
    }
}

impl NotificationStore for InMemoryNotificationStore {
    fn add<'a>(
        &'a self,
        user_id: &'a UserId,
        when: DateTime<Utc>,
        text: &'a str,
    ) -> BoxFuture<'a, Result<String, NotificationError>> {
        Box::pin(async move { self.insert(user_id, when, text) })
    }
}

pub struct AddNotificationTool {
    store: Arc<dyn NotificationStore>,
}

impl AddNotificationTool {
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self { store }
    }
}

fn rejection(error: NotificationError) -> ToolError {
    match error {
        NotificationError::InPast => ToolError::rejected(
            "That time has already passed. Tell me a time in the future and I'll remind you.",
        ),
        NotificationError::BeyondHorizon => ToolError::rejected(
            "That's too far ahead for a reminder. Please pick a date within the next year.",
        ),
        NotificationError::LimitReached { limit } => ToolError::rejected(format!(
            "You already have {limit} active reminders. Wait for one to fire before adding another."
        )),
        NotificationError::Storage(message) => ToolError::execution(message),
    }
}

impl Tool for AddNotificationTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "add_notification".to_string(),
            description: "Schedule a reminder message for the user at a specific time.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "when": {"type": "string", "description": "RFC 3339 timestamp with offset"},
                    "text": {"type": "string"}
                },
                "required": ["when", "text"]
            }),
        }
    }

    fn progress_label(&self) -> String {
        "Setting a reminder...".to_string()
    }

    fn invoke<'a>(
        &'a self,
        arguments: &'a ToolArguments,
        context: &'a ToolExecutionContext,
    ) -> ToolFuture<'a, Result<ToolOutput, ToolError>> {
        Box::pin(async move {
            let raw_when = required_string(arguments, "when")?;
            let text = required_string(arguments, "text")?;
            let when = DateTime::parse_from_rfc3339(&raw_when)
                .map_err(|err| {
                    ToolError::invalid_arguments(format!("'when' is not an RFC 3339 time: {err}"))
                })?
                .with_timezone(&Utc);

            let id = self
                .store
                .add(&context.user_id, when, &text)
                .await
                .map_err(rejection)?;
            let when = when.to_rfc3339();

            Ok(ToolOutput::new(json!({
                "status": "scheduled",
                "id": id,
                "when": when,
                "text": text,
            }))
            .with_artifact(Artifact::NotificationScheduled { id, when, text }))
        })
    }
}
