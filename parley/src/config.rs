//! Deployment configuration loaded from TOML or `PARLEY_*` environment
//! variables.
//!
//! Every field has a default, so an empty document is a valid configuration.
//!
//! ```rust
//! use parley::config::ParleyConfig;
//!
//! let config = ParleyConfig::from_toml_str(
//!     r#"
//!     model = "gpt-4o"
//!     history_window = 20
//!
//!     [history]
//!     backend = "in_memory"
//!     "#,
//! )
//! .expect("config parses");
//!
//! assert_eq!(config.exchange_policy().history_window, 20);
//! assert_eq!(config.turn_budget().max_images, 4);
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use pchat::{DEFAULT_MODEL, ExchangePolicy, LockPolicy, MAX_TOOL_ROUND_TRIPS, TurnBudget};
use pmemory::HistoryBackendConfig;
use pprovider::RetryPolicy;
use serde::{Deserialize, Serialize};

use crate::error::ParleyError;

const ENV_PREFIX: &str = "PARLEY_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    /// Default tracing filter; `RUST_LOG` overrides it.
    pub log_level: String,
    pub model: String,
    pub system_prompt: Option<String>,
    pub history_window: usize,
    pub max_tool_round_trips: u32,
    pub retry: RetryConfig,
    pub lock_acquire_timeout_secs: Option<u64>,
    pub turn: TurnConfig,
    pub history: HistoryBackendConfig,
    /// Report through `metrics` instead of `tracing` events.
    pub metrics: bool,
    pub openai: OpenAiConfig,
}

impl Default for ParleyConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            model: DEFAULT_MODEL.to_string(),
            system_prompt: None,
            history_window: 30,
            max_tool_round_trips: MAX_TOOL_ROUND_TRIPS,
            retry: RetryConfig::default(),
            lock_acquire_timeout_secs: None,
            turn: TurnConfig::default(),
            history: HistoryBackendConfig::default(),
            metrics: false,
            openai: OpenAiConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    pub per_document_tokens: usize,
    pub total_document_tokens: usize,
    pub max_images: usize,
    pub max_image_bytes: usize,
}

impl Default for TurnConfig {
    fn default() -> Self {
        let budget = TurnBudget::default();
        Self {
            per_document_tokens: budget.per_document_tokens,
            total_document_tokens: budget.total_document_tokens,
            max_images: budget.max_images,
            max_image_bytes: budget.max_image_bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    /// Any OpenAI-compatible endpoint; the public API when unset.
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            timeout_secs: 120,
        }
    }
}

impl ParleyConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ParleyError> {
        let config: Self = toml::from_str(raw)
            .map_err(|error| ParleyError::config(format!("invalid configuration: {error}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ParleyError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|error| {
            ParleyError::io(format!("failed to read {}: {error}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Reads `PARLEY_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ParleyError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from `lookup`, which is asked for each
    /// `PARLEY_*` key. Unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ParleyError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();

        if let Some(level) = var("LOG_LEVEL") {
            config.log_level = level;
        }
        if let Some(model) = var("MODEL") {
            config.model = model;
        }
        config.system_prompt = var("SYSTEM_PROMPT");
        if let Some(window) = parse_var(&var, "HISTORY_WINDOW")? {
            config.history_window = window;
        }
        if let Some(rounds) = parse_var(&var, "MAX_TOOL_ROUND_TRIPS")? {
            config.max_tool_round_trips = rounds;
        }
        if let Some(attempts) = parse_var(&var, "RETRY_MAX_ATTEMPTS")? {
            config.retry.max_attempts = attempts;
        }
        config.lock_acquire_timeout_secs = parse_var(&var, "LOCK_TIMEOUT_SECS")?;
        if let Some(max_images) = parse_var(&var, "MAX_IMAGES")? {
            config.turn.max_images = max_images;
        }
        if let Some(metrics) = parse_var(&var, "METRICS")? {
            config.metrics = metrics;
        }

        config.history = match var("HISTORY_BACKEND").as_deref() {
            Some("memory" | "in_memory") => HistoryBackendConfig::InMemory,
            Some("sqlite") | None => match var("HISTORY_PATH") {
                Some(path) => HistoryBackendConfig::Sqlite {
                    path: PathBuf::from(path),
                },
                None => HistoryBackendConfig::default(),
            },
            Some(other) => {
                return Err(ParleyError::config(format!(
                    "{ENV_PREFIX}HISTORY_BACKEND must be 'sqlite' or 'memory', got '{other}'"
                )));
            }
        };

        config.openai.api_key = var("OPENAI_API_KEY");
        config.openai.base_url = var("OPENAI_BASE_URL");
        if let Some(timeout) = parse_var(&var, "OPENAI_TIMEOUT_SECS")? {
            config.openai.timeout_secs = timeout;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry.max_attempts).with_backoff(
            Duration::from_millis(self.retry.initial_backoff_ms),
            Duration::from_millis(self.retry.max_backoff_ms),
        )
    }

    pub fn exchange_policy(&self) -> ExchangePolicy {
        let mut policy = ExchangePolicy::new(self.model.clone())
            .with_history_window(self.history_window)
            .with_max_tool_round_trips(self.max_tool_round_trips)
            .with_retry(self.retry_policy());
        if let Some(system_prompt) = &self.system_prompt {
            policy = policy.with_system_prompt(system_prompt.clone());
        }
        policy
    }

    pub fn turn_budget(&self) -> TurnBudget {
        TurnBudget {
            per_document_tokens: self.turn.per_document_tokens,
            total_document_tokens: self.turn.total_document_tokens,
            max_images: self.turn.max_images,
            max_image_bytes: self.turn.max_image_bytes,
            ..TurnBudget::default()
        }
    }

    pub fn lock_policy(&self) -> LockPolicy {
        match self.lock_acquire_timeout_secs {
            Some(secs) => LockPolicy::with_acquire_timeout(Duration::from_secs(secs)),
            None => LockPolicy::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ParleyError> {
        if self.retry.max_attempts == 0 {
            return Err(ParleyError::config("retry.max_attempts must be at least 1"));
        }
        self.exchange_policy()
            .validate()
            .and_then(|()| self.turn_budget().validate())
            .and_then(|()| self.lock_policy().validate())
            .map_err(|error| ParleyError::config(error.message))
    }
}

fn parse_var<T, V>(var: &V, name: &str) -> Result<Option<T>, ParleyError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    V: Fn(&str) -> Option<String>,
{
    var(name)
        .map(|raw| {
            raw.parse::<T>().map_err(|error| {
                ParleyError::config(format!("{ENV_PREFIX}{name}='{raw}' is invalid: {error}"))
            })
        })
        .transpose()
}
