//! Facade-level errors raised while loading configuration and wiring the
//! runtime.

use pchat::ChatError;
use pmemory::MemoryError;
use pprovider::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParleyErrorKind {
    Io,
    Config,
    Storage,
    Provider,
    Orchestrator,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct ParleyError {
    pub kind: ParleyErrorKind,
    pub message: String,
}

impl ParleyError {
    pub fn new(kind: ParleyErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ParleyErrorKind::Io, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ParleyErrorKind::Config, message)
    }
}

impl From<MemoryError> for ParleyError {
    fn from(error: MemoryError) -> Self {
        Self::new(ParleyErrorKind::Storage, error.to_string())
    }
}

impl From<ProviderError> for ParleyError {
    fn from(error: ProviderError) -> Self {
        Self::new(ParleyErrorKind::Provider, error.to_string())
    }
}

impl From<ChatError> for ParleyError {
    fn from(error: ChatError) -> Self {
        Self::new(ParleyErrorKind::Orchestrator, error.to_string())
    }
}
