//! Capability layer for registering, gating and executing tools.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use ptooling::builtin::{AddNotificationTool, InMemoryNotificationStore};
//! use ptooling::{QuotaKind, ToolGate, ToolRegistry};
//!
//! let mut registry = ToolRegistry::new();
//! registry.register(AddNotificationTool::new(Arc::new(InMemoryNotificationStore::default())));
//!
//! assert_eq!(registry.gate("add_notification"), ToolGate::Free);
//! assert_eq!(ToolGate::Metered(QuotaKind::Image).quota_kind(), Some(QuotaKind::Image));
//! ```

mod args;
pub mod builtin;
mod error;
mod hooks;
mod registry;
mod runtime;
mod tool;
mod types;

pub mod prelude {
    pub use crate::{
        Artifact, DefaultToolRuntime, QuotaKind, Tool, ToolError, ToolErrorKind,
        ToolExecutionContext, ToolExecutionResult, ToolFuture, ToolGate, ToolOutput, ToolRegistry,
        ToolRuntime,
    };
}

pub use args::{optional_string, optional_u32, required_string, required_u32};
pub use error::{ToolError, ToolErrorKind};
pub use hooks::{NoopToolRuntimeHooks, ToolRuntimeHooks};
pub use registry::ToolRegistry;
pub use runtime::{DefaultToolRuntime, ToolRuntime};
pub use tool::{FunctionTool, Tool, ToolFuture};
pub use types::{
    Artifact, DenialReason, ImageAttachment, QuotaKind, ToolExecutionContext, ToolExecutionResult,
    ToolGate, ToolOutput,
};
