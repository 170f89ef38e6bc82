//! Facade over the parley workspace crates.
//!
//! Most deployments depend on this crate alone: it re-exports the exchange
//! orchestrator and its contracts, loads [`config::ParleyConfig`], installs
//! tracing and wires everything into a [`runtime::RuntimeBundle`].
//!
//! ```rust
//! use parley::prelude::*;
//!
//! let config = ParleyConfig::default();
//! assert_eq!(config.exchange_policy().model, DEFAULT_MODEL);
//! ```

mod error;

pub mod config;
pub mod prelude;
pub mod runtime;
pub mod telemetry;

pub use pchat;
pub use pcommon;
pub use pmemory;
pub use pobserve;
pub use pprovider;
pub use ptooling;

pub use error::{ParleyError, ParleyErrorKind};

pub use pchat::{
    Answer, AnswerKind, ChatError, ChatErrorKind, ConversationLock, ConversationTurn,
    DEFAULT_MODEL, ErrorClassifier, ExchangeHooks, ExchangeOrchestrator, ExchangeOutcome,
    ExchangePolicy, ExchangeReport, HistoryStore, InMemoryHistoryStore, InboundDocument,
    InboundMessage, LockPolicy, MessageHandle, MessagingTransport, QuotaState, SubscriptionService,
    SubscriptionTier, ToolDispatcher, TurnBudget,
};
pub use pcommon::{BoxFuture, TraceId, UserId};
pub use pmemory::{HistoryBackendConfig, MemoryError, SqliteHistoryStore, create_history_store};
pub use pobserve::{
    MetricsObservabilityHooks, SafeExchangeHooks, SafeProviderHooks, SafeToolHooks,
    TracingObservabilityHooks,
};
pub use pprovider::{
    ConversationStrategy, ModelProvider, ProviderError, ProviderErrorKind, RetryPolicy,
    StatefulStrategy, StatelessStrategy,
};
pub use ptooling::{QuotaKind, Tool, ToolRegistry};

pub use config::ParleyConfig;
#[cfg(feature = "provider-openai")]
pub use runtime::openai_strategy;
pub use runtime::{Collaborators, RuntimeBundle, build_runtime, build_runtime_with_history};
pub use telemetry::init_tracing;
