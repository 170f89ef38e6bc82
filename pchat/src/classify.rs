//! Maps provider and tool failures to retry decisions and user-safe text.
//!
//! Raw provider wording only ever reaches logs; every category has one stable
//! message for the user.
//!
//! ```rust
//! use pchat::{ErrorCategory, ErrorClassifier, LogSeverity};
//! use pprovider::ProviderError;
//!
//! let classification =
//!     ErrorClassifier.classify_provider(&ProviderError::content_policy("flagged by safety system"));
//! assert_eq!(classification.category, ErrorCategory::ContentPolicy);
//! assert!(!classification.retry);
//! assert!(!classification.user_message.contains("safety"));
//! assert_eq!(classification.log_severity, LogSeverity::Error);
//! ```

use pprovider::{ProviderError, ProviderErrorKind};
use ptooling::{ToolError, ToolErrorKind};

use crate::{ChatError, ChatErrorKind};

pub const TRANSIENT_MESSAGE: &str =
    "Sorry, I'm having trouble reaching the assistant right now. Please try again in a moment.";
pub const RATE_LIMIT_MESSAGE: &str =
    "I'm getting a lot of requests right now. Please try again in a minute.";
pub const CONTENT_POLICY_MESSAGE: &str = "Sorry, I can't help with that request.";
pub const SERVICE_FAILURE_MESSAGE: &str =
    "Sorry, something went wrong on our side. Please try again later.";
pub const TOOL_FAILURE_MESSAGE: &str = "Sorry, that didn't work. Please try again.";
pub const STORAGE_FAILURE_MESSAGE: &str =
    "Sorry, I couldn't save our conversation. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Transient,
    RateLimited,
    Authentication,
    ContentPolicy,
    CreditExhausted,
    MalformedToolArguments,
    MalformedHistory,
    InvalidRequest,
    ToolFailure,
    Storage,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSeverity {
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub category: ErrorCategory,
    pub retry: bool,
    pub user_message: &'static str,
    pub log_severity: LogSeverity,
}

impl Classification {
    fn new(
        category: ErrorCategory,
        retry: bool,
        user_message: &'static str,
        log_severity: LogSeverity,
    ) -> Self {
        Self {
            category,
            retry,
            user_message,
            log_severity,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn classify_provider(&self, error: &ProviderError) -> Classification {
        use ErrorCategory as C;
        use LogSeverity::{Error, Warn};

        match error.kind {
            ProviderErrorKind::Timeout
            | ProviderErrorKind::Transport
            | ProviderErrorKind::Unavailable => {
                Classification::new(C::Transient, true, TRANSIENT_MESSAGE, Warn)
            }
            ProviderErrorKind::RateLimited => {
                Classification::new(C::RateLimited, true, RATE_LIMIT_MESSAGE, Warn)
            }
            ProviderErrorKind::MalformedToolArguments => Classification::new(
                C::MalformedToolArguments,
                true,
                TRANSIENT_MESSAGE,
                Warn,
            ),
            ProviderErrorKind::Authentication | ProviderErrorKind::PermissionDenied => {
                Classification::new(C::Authentication, false, SERVICE_FAILURE_MESSAGE, Error)
            }
            ProviderErrorKind::ContentPolicy => {
                Classification::new(C::ContentPolicy, false, CONTENT_POLICY_MESSAGE, Error)
            }
            ProviderErrorKind::CreditExhausted => {
                Classification::new(C::CreditExhausted, false, SERVICE_FAILURE_MESSAGE, Error)
            }
            ProviderErrorKind::MalformedHistory => {
                Classification::new(C::MalformedHistory, false, SERVICE_FAILURE_MESSAGE, Warn)
            }
            ProviderErrorKind::InvalidRequest => {
                Classification::new(C::InvalidRequest, false, SERVICE_FAILURE_MESSAGE, Error)
            }
            ProviderErrorKind::Other => {
                Classification::new(C::Other, false, SERVICE_FAILURE_MESSAGE, Error)
            }
        }
    }

    pub fn classify_tool(&self, error: &ToolError) -> Classification {
        let severity = if error.is_user_error() {
            LogSeverity::Warn
        } else {
            LogSeverity::Error
        };
        let category = match error.kind {
            ToolErrorKind::Timeout => ErrorCategory::Transient,
            ToolErrorKind::InvalidArguments => ErrorCategory::MalformedToolArguments,
            _ => ErrorCategory::ToolFailure,
        };

        Classification::new(category, error.is_retryable(), TOOL_FAILURE_MESSAGE, severity)
    }

    /// Classification for an error that has already crossed into the exchange
    /// layer.
    pub fn classify_chat(&self, error: &ChatError) -> Classification {
        if let Some(provider_kind) = error.provider_kind {
            return self.classify_provider(&ProviderError::new(
                provider_kind,
                error.message.clone(),
                false,
            ));
        }

        match error.kind {
            ChatErrorKind::StorageWriteFailed => Classification::new(
                ErrorCategory::Storage,
                false,
                STORAGE_FAILURE_MESSAGE,
                LogSeverity::Error,
            ),
            ChatErrorKind::ToolExecutionFailed => Classification::new(
                ErrorCategory::ToolFailure,
                false,
                TOOL_FAILURE_MESSAGE,
                LogSeverity::Error,
            ),
            ChatErrorKind::ContentPolicyBlocked => Classification::new(
                ErrorCategory::ContentPolicy,
                false,
                CONTENT_POLICY_MESSAGE,
                LogSeverity::Error,
            ),
            ChatErrorKind::ProviderTransient | ChatErrorKind::LockTimeout => Classification::new(
                ErrorCategory::Transient,
                false,
                TRANSIENT_MESSAGE,
                LogSeverity::Warn,
            ),
            _ => Classification::new(
                ErrorCategory::Other,
                false,
                SERVICE_FAILURE_MESSAGE,
                LogSeverity::Error,
            ),
        }
    }

    /// Logs the raw detail at the classified severity and returns the
    /// classification.
    pub fn report(&self, error: &ChatError) -> Classification {
        let classification = self.classify_chat(error);
        match classification.log_severity {
            LogSeverity::Warn => tracing::warn!(
                phase = ?error.phase,
                error_kind = ?error.kind,
                category = ?classification.category,
                detail = %error.message,
                "exchange failed"
            ),
            LogSeverity::Error => tracing::error!(
                phase = ?error.phase,
                error_kind = ?error.kind,
                category = ?classification.category,
                detail = %error.message,
                "exchange failed"
            ),
        }
        classification
    }
}
