//! Completion-provider layer: the shared request/response model, the error
//! taxonomy, retry policy, conversation strategies and HTTP adapters.
//!
//! ```rust
//! use pprovider::prelude::*;
//!
//! let request = ModelRequest::builder("gpt-4o-mini")
//!     .system("You are a helpful assistant.")
//!     .message(Message::new(Role::Human, "hello"))
//!     .build()
//!     .expect("request should be valid");
//!
//! assert_eq!(request.messages.len(), 1);
//! assert!(RetryPolicy::default().max_attempts >= 1);
//! ```

pub mod adapters;
mod error;
mod model;
pub mod prelude;
mod provider;
mod resilience;
mod strategy;

pub use error::{ProviderError, ProviderErrorKind};
pub use model::{
    ContentPart, Message, ModelRequest, ModelRequestBuilder, ModelResponse, OutputItem, ProviderId,
    Role, StopReason, TokenUsage, ToolArguments, ToolCall, ToolDefinition, ToolResult,
    canonical_json,
};
pub use provider::{ModelProvider, ProviderFuture};
pub use resilience::{
    NoopOperationHooks, ProviderOperationHooks, RetryPolicy, execute_with_retry,
};
pub use strategy::{
    ConversationStrategy, RemoteRun, RemoteRunStatus, RemoteThreadProvider, SettleOutcome,
    SettlePolicy, StatefulStrategy, StatelessStrategy,
};
