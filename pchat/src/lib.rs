//! Tool-augmented conversation orchestration.
//!
//! One [`ExchangeOrchestrator::run_exchange`] call takes an inbound user
//! message to a terminal [`ExchangeOutcome`]: it serializes the user's
//! exchanges, replays a bounded history window, runs the provider/tool loop
//! with subscription gating, repairs malformed history and classifies
//! failures into user-safe text.
//!
//! ```rust
//! use pchat::prelude::*;
//!
//! let calls = RoundCalls::dedup(Vec::new());
//! assert!(calls.is_empty());
//! assert_eq!(ExchangePolicy::new("gpt-4o-mini").history_window, 30);
//! ```

mod classify;
mod dispatch;
mod error;
mod hooks;
mod lock;
mod orchestrator;
mod policy;
mod repair;
mod store;
mod turn_builder;
mod types;

pub mod prelude {
    pub use crate::{
        Answer, AnswerKind, ChatError, ChatErrorKind, ConversationLock, ConversationTurn,
        ExchangeHooks, ExchangeOrchestrator, ExchangeOutcome, ExchangePolicy, ExchangeReport,
        HistoryStore, InMemoryHistoryStore, InboundDocument, InboundMessage, LockPolicy,
        MessagingTransport, QuotaState, RoundCalls, SubscriptionService, SubscriptionTier,
        ToolDispatcher, TurnBudget, TurnRole,
    };
    pub use pcommon::{TraceId, UserId};
    pub use ptooling::{ImageAttachment, QuotaKind, Tool, ToolRegistry};
}

pub use classify::{
    CONTENT_POLICY_MESSAGE, Classification, ErrorCategory, ErrorClassifier, LogSeverity,
    RATE_LIMIT_MESSAGE, SERVICE_FAILURE_MESSAGE, STORAGE_FAILURE_MESSAGE, TOOL_FAILURE_MESSAGE,
    TRANSIENT_MESSAGE,
};
pub use dispatch::{
    Denial, DispatchPrompts, MessageHandle, MessagingTransport, NoopMessagingTransport,
    QuotaState, RoundCalls, RoundOutcome, SubscriptionService, SubscriptionTier, ToolCallRecord,
    ToolCallState, ToolDispatcher,
};
pub use error::{ChatError, ChatErrorKind, ChatErrorPhase};
pub use hooks::{ExchangeHooks, NoopExchangeHooks, RepairMode};
pub use lock::{ConversationGuard, ConversationLock};
pub use orchestrator::{DEFAULT_MODEL, ExchangeOrchestrator, ExchangeOrchestratorBuilder};
pub use policy::{ExchangePolicy, LockPolicy, MAX_TOOL_ROUND_TRIPS, TurnBudget};
pub use repair::{RepairOutcome, is_structurally_valid, repair_history, strip_tool_turns};
pub use store::{ChatFuture, HistoryStore, InMemoryHistoryStore};
pub use turn_builder::{BuiltTurn, IMAGE_MARKER, Truncation, TurnBuilder};
pub use types::{
    Answer, AnswerKind, ConversationTurn, ExchangeOutcome, ExchangeReport, InboundDocument,
    InboundMessage, PendingExchange, TurnRole,
};
