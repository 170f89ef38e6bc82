//! Common `pprovider` imports for downstream crates.

pub use crate::{
    ContentPart, ConversationStrategy, Message, ModelProvider, ModelRequest, ModelRequestBuilder,
    ModelResponse, NoopOperationHooks, OutputItem, ProviderError, ProviderErrorKind, ProviderId,
    ProviderOperationHooks, RetryPolicy, Role, StatefulStrategy, StatelessStrategy, StopReason,
    TokenUsage, ToolCall, ToolDefinition, ToolResult, execute_with_retry,
};
pub use pcommon::{BoxFuture, MetadataMap, UserId};
