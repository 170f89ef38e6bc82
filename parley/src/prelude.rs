//! Common imports for parley deployments.

pub use crate::{
    Answer, AnswerKind, Collaborators, ConversationStrategy, DEFAULT_MODEL, ExchangeOrchestrator,
    ExchangeOutcome, ExchangeReport, HistoryBackendConfig, HistoryStore, InboundDocument,
    InboundMessage, MessageHandle, MessagingTransport, ParleyConfig, ParleyError, QuotaKind,
    QuotaState, RuntimeBundle, SubscriptionService, SubscriptionTier, Tool, ToolRegistry, UserId,
    build_runtime, build_runtime_with_history, init_tracing,
};
