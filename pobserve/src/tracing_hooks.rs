//! Tracing-based observability hooks for provider, tool and exchange phases.
//!
//! ```rust
//! use pchat::ExchangeHooks;
//! use pobserve::TracingObservabilityHooks;
//!
//! fn accepts_exchange_hooks(_hooks: &dyn ExchangeHooks) {}
//!
//! let hooks = TracingObservabilityHooks;
//! accepts_exchange_hooks(&hooks);
//! ```

use std::time::Duration;

use pchat::{ChatError, ExchangeHooks, ExchangeReport, RepairMode};
use pcommon::UserId;
use pprovider::{ProviderError, ProviderId, ProviderOperationHooks, ToolCall};
use ptooling::{
    DenialReason, ToolError, ToolExecutionContext, ToolExecutionResult, ToolRuntimeHooks,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObservabilityHooks;

impl ProviderOperationHooks for TracingObservabilityHooks {
    fn on_attempt_start(&self, provider: ProviderId, operation: &str, attempt: u32) {
        tracing::debug!(
            phase = "provider",
            event = "attempt_start",
            provider = %provider,
            operation,
            attempt
        );
    }

    fn on_retry_scheduled(
        &self,
        provider: ProviderId,
        operation: &str,
        attempt: u32,
        delay: Duration,
        error: &ProviderError,
    ) {
        tracing::warn!(
            phase = "provider",
            event = "retry_scheduled",
            provider = %provider,
            operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error_kind = ?error.kind,
            error = %error
        );
    }

    fn on_success(&self, provider: ProviderId, operation: &str, attempts: u32) {
        tracing::debug!(
            phase = "provider",
            event = "success",
            provider = %provider,
            operation,
            attempts
        );
    }

    fn on_failure(
        &self,
        provider: ProviderId,
        operation: &str,
        attempts: u32,
        error: &ProviderError,
    ) {
        tracing::warn!(
            phase = "provider",
            event = "failure",
            provider = %provider,
            operation,
            attempts,
            error_kind = ?error.kind,
            retryable = error.retryable,
            error = %error
        );
    }
}

impl ToolRuntimeHooks for TracingObservabilityHooks {
    fn on_authorization_denied(
        &self,
        tool_call: &ToolCall,
        context: &ToolExecutionContext,
        reason: DenialReason,
    ) {
        tracing::info!(
            phase = "authorization",
            event = "denied",
            user_id = %context.user_id,
            tool_name = %tool_call.name,
            tool_call_id = %tool_call.id,
            reason = ?reason
        );
    }

    fn on_execution_start(&self, tool_call: &ToolCall, context: &ToolExecutionContext) {
        tracing::info!(
            phase = "tooling",
            event = "execution_start",
            user_id = %context.user_id,
            tool_name = %tool_call.name,
            tool_call_id = %tool_call.id,
            trace_id = ?context.trace_id
        );
    }

    fn on_execution_success(
        &self,
        tool_call: &ToolCall,
        context: &ToolExecutionContext,
        result: &ToolExecutionResult,
        elapsed: Duration,
    ) {
        tracing::info!(
            phase = "tooling",
            event = "execution_success",
            user_id = %context.user_id,
            tool_name = %tool_call.name,
            tool_call_id = %tool_call.id,
            units = result.output.units(),
            elapsed_ms = elapsed.as_millis() as u64
        );
    }

    fn on_execution_failure(
        &self,
        tool_call: &ToolCall,
        context: &ToolExecutionContext,
        error: &ToolError,
        elapsed: Duration,
    ) {
        tracing::warn!(
            phase = "tooling",
            event = "execution_failure",
            user_id = %context.user_id,
            tool_name = %tool_call.name,
            tool_call_id = %tool_call.id,
            error_kind = ?error.kind,
            elapsed_ms = elapsed.as_millis() as u64,
            error = %error
        );
    }
}

impl ExchangeHooks for TracingObservabilityHooks {
    fn on_exchange_start(&self, user_id: &UserId) {
        tracing::debug!(phase = "exchange", event = "start", user_id = %user_id);
    }

    fn on_round_complete(&self, user_id: &UserId, round: u32, tool_calls: usize) {
        tracing::debug!(
            phase = "exchange",
            event = "round_complete",
            user_id = %user_id,
            round,
            tool_calls
        );
    }

    fn on_history_repaired(&self, user_id: &UserId, removed: usize, mode: RepairMode) {
        tracing::warn!(
            phase = "history",
            event = "repaired",
            user_id = %user_id,
            mode = mode.as_str(),
            removed
        );
    }

    fn on_storage_failure(&self, user_id: &UserId, error: &ChatError) {
        tracing::error!(
            phase = "history",
            event = "storage_failure",
            user_id = %user_id,
            error_kind = ?error.kind,
            error = %error
        );
    }

    fn on_exchange_complete(&self, user_id: &UserId, report: &ExchangeReport, elapsed: Duration) {
        tracing::info!(
            phase = "exchange",
            event = "complete",
            user_id = %user_id,
            outcome = report.outcome.as_str(),
            rounds = report.rounds,
            executed_tool_calls = report.executed_tool_calls,
            history_repairs = report.history_repairs,
            round_limit_reached = report.round_limit_reached,
            elapsed_ms = elapsed.as_millis() as u64
        );
    }
}
