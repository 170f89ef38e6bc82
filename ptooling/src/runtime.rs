//! Tool runtime trait and default registry-backed executor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_timer::Delay;
use futures_util::future::{Either, select};
use pprovider::ToolCall;

use crate::{
    NoopToolRuntimeHooks, ToolError, ToolExecutionContext, ToolExecutionResult, ToolFuture,
    ToolRegistry, ToolRuntimeHooks,
};

pub trait ToolRuntime: Send + Sync {
    fn execute<'a>(
        &'a self,
        tool_call: &'a ToolCall,
        context: &'a ToolExecutionContext,
    ) -> ToolFuture<'a, Result<ToolExecutionResult, ToolError>>;
}

#[derive(Clone)]
pub struct DefaultToolRuntime {
    registry: Arc<ToolRegistry>,
    hooks: Arc<dyn ToolRuntimeHooks>,
    timeout: Option<Duration>,
}

impl DefaultToolRuntime {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            hooks: Arc::new(NoopToolRuntimeHooks),
            timeout: None,
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ToolRuntimeHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Upper bound for a single invocation; exceeding it fails with `Timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn registry(&self) -> Arc<ToolRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn hooks(&self) -> Arc<dyn ToolRuntimeHooks> {
        Arc::clone(&self.hooks)
    }

    async fn invoke(
        &self,
        tool_call: &ToolCall,
        context: &ToolExecutionContext,
    ) -> Result<ToolExecutionResult, ToolError> {
        let tool = self.registry.get(&tool_call.name).ok_or_else(|| {
            ToolError::not_found(format!("tool '{}' is not registered", tool_call.name))
        })?;

        let invocation = tool.invoke(&tool_call.arguments, context);
        let output = match self.timeout {
            None => invocation.await?,
            Some(limit) => match select(invocation, Delay::new(limit)).await {
                Either::Left((output, _)) => output?,
                Either::Right(((), _)) => {
                    tracing::warn!(
                        phase = "tool",
                        event = "timeout",
                        user_id = %context.user_id,
                        tool_name = %tool_call.name,
                        tool_call_id = %tool_call.id,
                        elapsed_ms = limit.as_millis() as u64,
                        "tool invocation abandoned"
                    );
                    return Err(ToolError::timeout(format!(
                        "tool did not finish within {} ms",
                        limit.as_millis()
                    )));
                }
            },
        };

        Ok(ToolExecutionResult::from_call(tool_call, output))
    }
}

impl ToolRuntime for DefaultToolRuntime {
    fn execute<'a>(
        &'a self,
        tool_call: &'a ToolCall,
        context: &'a ToolExecutionContext,
    ) -> ToolFuture<'a, Result<ToolExecutionResult, ToolError>> {
        Box::pin(async move {
            self.hooks.on_execution_start(tool_call, context);
            let started = Instant::now();

            match self.invoke(tool_call, context).await {
                Ok(result) => {
                    self.hooks
                        .on_execution_success(tool_call, context, &result, started.elapsed());
                    Ok(result)
                }
                Err(error) => {
                    let error = error
                        .with_tool_name(tool_call.name.clone())
                        .with_tool_call_id(tool_call.id.clone());
                    self.hooks
                        .on_execution_failure(tool_call, context, &error, started.elapsed());
                    Err(error)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use pprovider::{ToolArguments, ToolDefinition};
    use serde_json::json;

    use super::*;
    use crate::{Tool, ToolErrorKind, ToolOutput};

    fn definition(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.to_string(),
            description: format!("{name} tool"),
            input_schema: json!({"type": "object"}),
        }
    }

    struct SlowTool;

    impl Tool for SlowTool {
        fn definition(&self) -> ToolDefinition {
            definition("slow")
        }

        fn invoke<'a>(
            &'a self,
            _arguments: &'a ToolArguments,
            _context: &'a ToolExecutionContext,
        ) -> ToolFuture<'a, Result<ToolOutput, ToolError>> {
            Box::pin(async {
                Delay::new(Duration::from_secs(5)).await;
                Ok(ToolOutput::new(json!({"status": "completed"})))
            })
        }
    }

    #[derive(Default)]
    struct RecordingHooks {
        events: Mutex<Vec<String>>,
    }

    impl ToolRuntimeHooks for RecordingHooks {
        fn on_execution_start(&self, tool_call: &ToolCall, _context: &ToolExecutionContext) {
            self.events
                .lock()
                .expect("events lock")
                .push(format!("start:{}", tool_call.name));
        }

        fn on_execution_failure(
            &self,
            tool_call: &ToolCall,
            _context: &ToolExecutionContext,
            error: &ToolError,
            _elapsed: Duration,
        ) {
            self.events
                .lock()
                .expect("events lock")
                .push(format!("failure:{}:{:?}", tool_call.name, error.kind));
        }
    }

    #[tokio::test]
    async fn runtime_executes_registered_tool_with_context() {
        let mut registry = ToolRegistry::new();
        registry.register_fn(definition("echo"), |arguments, context| async move {
            Ok(ToolOutput::new(json!({
                "user": context.user_id.as_str(),
                "args": arguments,
            })))
        });
        let runtime = DefaultToolRuntime::new(Arc::new(registry));
        let mut arguments = ToolArguments::new();
        arguments.insert("q".to_string(), json!("hi"));
        let call = ToolCall::new("call_1", "echo", arguments);

        let result = runtime
            .execute(&call, &ToolExecutionContext::new("user-1"))
            .await
            .expect("execution should succeed");

        assert_eq!(result.tool_call_id, "call_1");
        assert_eq!(
            result.output.payload,
            json!({"user": "user-1", "args": {"q": "hi"}})
        );
    }

    #[tokio::test]
    async fn unknown_tool_fails_with_context_attached() {
        let hooks = Arc::new(RecordingHooks::default());
        let runtime =
            DefaultToolRuntime::new(Arc::new(ToolRegistry::new())).with_hooks(hooks.clone());
        let call = ToolCall::new("call_2", "missing", ToolArguments::new());

        let error = runtime
            .execute(&call, &ToolExecutionContext::new("user-2"))
            .await
            .expect_err("execution should fail");

        assert_eq!(error.kind, ToolErrorKind::NotFound);
        assert_eq!(error.tool_call_id.as_deref(), Some("call_2"));
        assert_eq!(
            hooks.events.lock().expect("events lock").as_slice(),
            ["start:missing".to_string(), "failure:missing:NotFound".to_string()]
        );
    }

    #[tokio::test]
    async fn slow_tools_time_out() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool);
        let runtime =
            DefaultToolRuntime::new(Arc::new(registry)).with_timeout(Duration::from_millis(10));
        let call = ToolCall::new("call_3", "slow", ToolArguments::new());

        let error = runtime
            .execute(&call, &ToolExecutionContext::new("user-3"))
            .await
            .expect_err("should time out");

        assert_eq!(error.kind, ToolErrorKind::Timeout);
    }

    #[test]
    fn registry_tracks_registered_tools_in_order() {
        let mut registry = ToolRegistry::new();
        assert!(registry.is_empty());

        registry.register(SlowTool);
        registry.register_fn(definition("echo"), |_, _| async {
            Ok(ToolOutput::new(json!(null)))
        });

        let names = registry
            .definitions()
            .into_iter()
            .map(|definition| definition.name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["slow".to_string(), "echo".to_string()]);
        assert!(registry.remove("slow").is_some());
        assert_eq!(registry.len(), 1);
    }
}
