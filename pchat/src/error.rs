//! Exchange-layer errors and classification.

use pprovider::{ProviderError, ProviderErrorKind};
use ptooling::ToolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatErrorKind {
    InvalidRequest,
    SubscriptionRequired,
    QuotaExhausted,
    ProviderTransient,
    ProviderFatal,
    ContentPolicyBlocked,
    MalformedHistory,
    ToolExecutionFailed,
    StorageWriteFailed,
    LockTimeout,
}

/// Where in the exchange an error surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatErrorPhase {
    TurnBuilding,
    Locking,
    History,
    Provider,
    Tooling,
    Authorization,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct ChatError {
    pub kind: ChatErrorKind,
    pub message: String,
    pub phase: Option<ChatErrorPhase>,
    /// Provider-side classification, kept for logging and retry decisions.
    pub provider_kind: Option<ProviderErrorKind>,
}

impl ChatError {
    pub fn new(kind: ChatErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            phase: None,
            provider_kind: None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::InvalidRequest, message).with_phase(ChatErrorPhase::TurnBuilding)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::StorageWriteFailed, message).with_phase(ChatErrorPhase::History)
    }

    pub fn lock_timeout(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::LockTimeout, message).with_phase(ChatErrorPhase::Locking)
    }

    pub fn subscription_required(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::SubscriptionRequired, message)
            .with_phase(ChatErrorPhase::Authorization)
    }

    pub fn quota_exhausted(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::QuotaExhausted, message).with_phase(ChatErrorPhase::Authorization)
    }

    pub fn tool_execution(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::ToolExecutionFailed, message).with_phase(ChatErrorPhase::Tooling)
    }

    pub fn with_phase(mut self, phase: ChatErrorPhase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == ChatErrorKind::ProviderTransient
    }

    pub fn is_user_error(&self) -> bool {
        self.kind == ChatErrorKind::InvalidRequest
    }
}

impl From<ProviderError> for ChatError {
    fn from(value: ProviderError) -> Self {
        let kind = match value.kind {
            ProviderErrorKind::ContentPolicy => ChatErrorKind::ContentPolicyBlocked,
            ProviderErrorKind::MalformedHistory => ChatErrorKind::MalformedHistory,
            ProviderErrorKind::RateLimited
            | ProviderErrorKind::Timeout
            | ProviderErrorKind::Transport
            | ProviderErrorKind::Unavailable
            | ProviderErrorKind::MalformedToolArguments => ChatErrorKind::ProviderTransient,
            ProviderErrorKind::Authentication
            | ProviderErrorKind::PermissionDenied
            | ProviderErrorKind::CreditExhausted
            | ProviderErrorKind::InvalidRequest
            | ProviderErrorKind::Other => ChatErrorKind::ProviderFatal,
        };

        Self {
            kind,
            message: value.message,
            phase: Some(ChatErrorPhase::Provider),
            provider_kind: Some(value.kind),
        }
    }
}

impl From<ToolError> for ChatError {
    fn from(value: ToolError) -> Self {
        ChatError::tool_execution(value.to_string())
    }
}
