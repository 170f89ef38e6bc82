//! Provider error kinds and constructor helpers.
//!
//! ```rust
//! use pprovider::ProviderError;
//!
//! let auth = ProviderError::authentication("bad key");
//! assert!(!auth.retryable);
//!
//! let timeout = ProviderError::timeout("temporary timeout");
//! assert!(timeout.retryable);
//! ```

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorKind {
    Authentication,
    PermissionDenied,
    RateLimited,
    InvalidRequest,
    MalformedHistory,
    MalformedToolArguments,
    ContentPolicy,
    CreditExhausted,
    Timeout,
    Transport,
    Unavailable,
    Other,
}

impl ProviderErrorKind {
    /// Kinds that a later attempt with the same request can plausibly clear.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::RateLimited
                | Self::Timeout
                | Self::Transport
                | Self::Unavailable
                | Self::MalformedToolArguments
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable,
        }
    }

    fn of(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, kind.is_transient())
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::of(ProviderErrorKind::Authentication, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::of(ProviderErrorKind::PermissionDenied, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::of(ProviderErrorKind::RateLimited, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::of(ProviderErrorKind::InvalidRequest, message)
    }

    pub fn malformed_history(message: impl Into<String>) -> Self {
        Self::of(ProviderErrorKind::MalformedHistory, message)
    }

    pub fn malformed_tool_arguments(message: impl Into<String>) -> Self {
        Self::of(ProviderErrorKind::MalformedToolArguments, message)
    }

    pub fn content_policy(message: impl Into<String>) -> Self {
        Self::of(ProviderErrorKind::ContentPolicy, message)
    }

    pub fn credit_exhausted(message: impl Into<String>) -> Self {
        Self::of(ProviderErrorKind::CreditExhausted, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::of(ProviderErrorKind::Timeout, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::of(ProviderErrorKind::Transport, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::of(ProviderErrorKind::Unavailable, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::of(ProviderErrorKind::Other, message)
    }
}
