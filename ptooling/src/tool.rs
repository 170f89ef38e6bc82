//! Tool trait contract for registry-managed capabilities.
//!
//! ```rust
//! use pprovider::ToolDefinition;
//! use ptooling::{FunctionTool, Tool, ToolGate, ToolOutput};
//! use serde_json::{Value, json};
//!
//! let tool = FunctionTool::new(
//!     ToolDefinition {
//!         name: "echo".to_string(),
//!         description: "Echoes input".to_string(),
//!         input_schema: json!({"type": "object"}),
//!     },
//!     |args, _ctx| async move { Ok(ToolOutput::new(Value::Object(args))) },
//! );
//!
//! assert_eq!(tool.definition().name, "echo");
//! assert_eq!(tool.gate(), ToolGate::Free);
//! ```

use std::future::Future;
use std::sync::Arc;

use pcommon::BoxFuture;
use pprovider::{ToolArguments, ToolDefinition};

use crate::{ToolError, ToolExecutionContext, ToolGate, ToolOutput};

pub type ToolFuture<'a, T> = BoxFuture<'a, T>;

pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    fn gate(&self) -> ToolGate {
        ToolGate::Free
    }

    /// Argument that sets how many quota units one call spends, if the caller
    /// chooses it.
    fn units_argument(&self) -> Option<&'static str> {
        None
    }

    /// Short text shown to the user while the tool runs.
    fn progress_label(&self) -> String {
        "Working on it...".to_string()
    }

    fn invoke<'a>(
        &'a self,
        arguments: &'a ToolArguments,
        context: &'a ToolExecutionContext,
    ) -> ToolFuture<'a, Result<ToolOutput, ToolError>>;
}

type ToolHandler = dyn Fn(ToolArguments, ToolExecutionContext) -> ToolFuture<'static, Result<ToolOutput, ToolError>>
    + Send
    + Sync;

pub struct FunctionTool {
    definition: ToolDefinition,
    gate: ToolGate,
    handler: Arc<ToolHandler>,
}

impl FunctionTool {
    pub fn new<F, Fut>(definition: ToolDefinition, handler: F) -> Self
    where
        F: Fn(ToolArguments, ToolExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput, ToolError>> + Send + 'static,
    {
        let handler: Arc<ToolHandler> =
            Arc::new(move |arguments, context| Box::pin(handler(arguments, context)));

        Self {
            definition,
            gate: ToolGate::Free,
            handler,
        }
    }

    pub fn with_gate(mut self, gate: ToolGate) -> Self {
        self.gate = gate;
        self
    }
}

impl Tool for FunctionTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    fn gate(&self) -> ToolGate {
        self.gate
    }

    fn invoke<'a>(
        &'a self,
        arguments: &'a ToolArguments,
        context: &'a ToolExecutionContext,
    ) -> ToolFuture<'a, Result<ToolOutput, ToolError>> {
        (self.handler)(arguments.clone(), context.clone())
    }
}
