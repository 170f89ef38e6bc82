//! Runtime knobs for exchanges, inbound turn budgets and lock acquisition.
//!
//! ```rust
//! use pchat::{ExchangePolicy, TurnBudget};
//!
//! let policy = ExchangePolicy::new("gpt-4o-mini").with_history_window(10);
//! assert!(policy.validate().is_ok());
//! assert_eq!(policy.max_tool_round_trips, 8);
//!
//! let budget = TurnBudget::default();
//! assert_eq!(budget.per_document_chars(), 32_000);
//! assert!(budget.supports_extension("MD"));
//! ```

use std::time::Duration;

use pcommon::GenerationOptions;
use pprovider::RetryPolicy;

use crate::ChatError;

/// Hard ceiling on provider submissions in one exchange.
pub const MAX_TOOL_ROUND_TRIPS: u32 = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct ExchangePolicy {
    pub model: String,
    pub system_prompt: Option<String>,
    pub history_window: usize,
    pub max_tool_round_trips: u32,
    pub retry: RetryPolicy,
    pub options: GenerationOptions,
}

impl ExchangePolicy {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: None,
            history_window: 30,
            max_tool_round_trips: MAX_TOOL_ROUND_TRIPS,
            retry: RetryPolicy::default(),
            options: GenerationOptions::default(),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_history_window(mut self, history_window: usize) -> Self {
        self.history_window = history_window;
        self
    }

    pub fn with_max_tool_round_trips(mut self, max_tool_round_trips: u32) -> Self {
        self.max_tool_round_trips = max_tool_round_trips;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn validate(&self) -> Result<(), ChatError> {
        if self.model.trim().is_empty() {
            return Err(ChatError::invalid_request("model must not be empty"));
        }
        if self.history_window == 0 {
            return Err(ChatError::invalid_request(
                "history_window must be greater than zero",
            ));
        }
        if !(1..=MAX_TOOL_ROUND_TRIPS).contains(&self.max_tool_round_trips) {
            return Err(ChatError::invalid_request(format!(
                "max_tool_round_trips must be between 1 and {MAX_TOOL_ROUND_TRIPS}"
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ChatError::invalid_request("retry.max_attempts must be at least 1"));
        }

        Ok(())
    }
}

/// Size limits applied to one inbound message before it reaches a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnBudget {
    pub per_document_tokens: usize,
    pub total_document_tokens: usize,
    pub chars_per_token: usize,
    pub max_images: usize,
    pub max_image_bytes: usize,
    pub supported_document_extensions: Vec<String>,
}

impl Default for TurnBudget {
    fn default() -> Self {
        let supported_document_extensions = [
            "txt", "md", "csv", "json", "log", "xml", "yaml", "yml", "html", "py", "rs", "js",
            "ts", "toml", "ini",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();

        Self {
            per_document_tokens: 8_000,
            total_document_tokens: 24_000,
            chars_per_token: 4,
            max_images: 4,
            max_image_bytes: 5 * 1024 * 1024,
            supported_document_extensions,
        }
    }
}

impl TurnBudget {
    pub fn per_document_chars(&self) -> usize {
        self.per_document_tokens.saturating_mul(self.chars_per_token)
    }

    pub fn total_document_chars(&self) -> usize {
        self.total_document_tokens.saturating_mul(self.chars_per_token)
    }

    pub fn supports_extension(&self, extension: &str) -> bool {
        self.supported_document_extensions
            .iter()
            .any(|supported| supported.eq_ignore_ascii_case(extension))
    }

    pub fn with_max_images(mut self, max_images: usize) -> Self {
        self.max_images = max_images;
        self
    }

    pub fn with_document_tokens(mut self, per_document: usize, total: usize) -> Self {
        self.per_document_tokens = per_document;
        self.total_document_tokens = total;
        self
    }

    pub fn validate(&self) -> Result<(), ChatError> {
        if self.chars_per_token == 0 {
            return Err(ChatError::invalid_request("chars_per_token must be greater than zero"));
        }
        if self.per_document_tokens == 0 || self.total_document_tokens == 0 {
            return Err(ChatError::invalid_request(
                "document token budgets must be greater than zero",
            ));
        }
        if self.per_document_tokens > self.total_document_tokens {
            return Err(ChatError::invalid_request(
                "per_document_tokens must not exceed total_document_tokens",
            ));
        }
        if self.max_image_bytes == 0 {
            return Err(ChatError::invalid_request("max_image_bytes must be greater than zero"));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockPolicy {
    /// `None` waits for the previous exchange however long it takes.
    pub acquire_timeout: Option<Duration>,
}

impl LockPolicy {
    pub fn with_acquire_timeout(timeout: Duration) -> Self {
        Self {
            acquire_timeout: Some(timeout),
        }
    }

    pub fn validate(&self) -> Result<(), ChatError> {
        if self.acquire_timeout == Some(Duration::ZERO) {
            return Err(ChatError::invalid_request("acquire_timeout must be non-zero"));
        }

        Ok(())
    }
}
