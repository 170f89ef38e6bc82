//! Tool registry for lookup by tool definition name.

use std::future::Future;
use std::sync::Arc;

use pcommon::Registry;
use pprovider::{ToolArguments, ToolDefinition};

use crate::{FunctionTool, Tool, ToolError, ToolExecutionContext, ToolGate, ToolOutput};

#[derive(Default)]
pub struct ToolRegistry {
    tools: Registry<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name;
        self.tools.insert(name, tool);
    }

    pub fn register_fn<F, Fut>(&mut self, definition: ToolDefinition, handler: F)
    where
        F: Fn(ToolArguments, ToolExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput, ToolError>> + Send + 'static,
    {
        self.register(FunctionTool::new(definition, handler));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Gate of a registered tool; unknown tools are treated as free and fail
    /// later with `NotFound`.
    pub fn gate(&self, name: &str) -> ToolGate {
        self.tools.get(name).map_or(ToolGate::Free, |tool| tool.gate())
    }

    pub fn units_argument(&self, name: &str) -> Option<&'static str> {
        self.tools.get(name).and_then(|tool| tool.units_argument())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.remove(name)
    }

    /// The static schema offered on every round, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|tool| tool.definition()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
