//! Errors raised by the durable history backends.

use pchat::{ChatError, ChatErrorPhase};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryErrorKind {
    Storage,
    Corrupt,
    InvalidRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct MemoryError {
    pub kind: MemoryErrorKind,
    pub message: String,
}

impl MemoryError {
    pub fn new(kind: MemoryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(MemoryErrorKind::Storage, message)
    }

    /// A stored row that no longer decodes into a turn.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::new(MemoryErrorKind::Corrupt, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(MemoryErrorKind::InvalidRequest, message)
    }
}

impl From<MemoryError> for ChatError {
    fn from(error: MemoryError) -> Self {
        ChatError::storage(error.message).with_phase(ChatErrorPhase::History)
    }
}
