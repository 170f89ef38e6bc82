//! Metrics-based observability hooks for provider, tool and exchange phases.
//!
//! ```rust
//! use pobserve::MetricsObservabilityHooks;
//! use pprovider::ProviderOperationHooks;
//!
//! fn accepts_provider_hooks(_hooks: &dyn ProviderOperationHooks) {}
//!
//! let hooks = MetricsObservabilityHooks;
//! accepts_provider_hooks(&hooks);
//! ```

use std::time::Duration;

use pchat::{ChatError, ExchangeHooks, ExchangeReport, RepairMode};
use pcommon::UserId;
use pprovider::{ProviderError, ProviderId, ProviderOperationHooks, ToolCall};
use ptooling::{
    DenialReason, ToolError, ToolExecutionContext, ToolExecutionResult, ToolRuntimeHooks,
};

/// Records counters and histograms under the `parley_` prefix. Labels never
/// carry user ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsObservabilityHooks;

impl ProviderOperationHooks for MetricsObservabilityHooks {
    fn on_attempt_start(&self, provider: ProviderId, operation: &str, _attempt: u32) {
        metrics::counter!(
            "parley_provider_attempt_start_total",
            "provider" => provider.to_string(),
            "operation" => operation.to_string()
        )
        .increment(1);
    }

    fn on_retry_scheduled(
        &self,
        provider: ProviderId,
        operation: &str,
        _attempt: u32,
        delay: Duration,
        error: &ProviderError,
    ) {
        metrics::counter!(
            "parley_provider_retry_scheduled_total",
            "provider" => provider.to_string(),
            "operation" => operation.to_string(),
            "error_kind" => format!("{:?}", error.kind)
        )
        .increment(1);
        metrics::histogram!(
            "parley_provider_retry_delay_seconds",
            "provider" => provider.to_string(),
            "operation" => operation.to_string()
        )
        .record(delay.as_secs_f64());
    }

    fn on_success(&self, provider: ProviderId, operation: &str, attempts: u32) {
        metrics::counter!(
            "parley_provider_success_total",
            "provider" => provider.to_string(),
            "operation" => operation.to_string()
        )
        .increment(1);
        metrics::histogram!(
            "parley_provider_attempts_per_success",
            "provider" => provider.to_string(),
            "operation" => operation.to_string()
        )
        .record(f64::from(attempts));
    }

    fn on_failure(
        &self,
        provider: ProviderId,
        operation: &str,
        _attempts: u32,
        error: &ProviderError,
    ) {
        metrics::counter!(
            "parley_provider_failure_total",
            "provider" => provider.to_string(),
            "operation" => operation.to_string(),
            "error_kind" => format!("{:?}", error.kind)
        )
        .increment(1);
    }
}

impl ToolRuntimeHooks for MetricsObservabilityHooks {
    fn on_authorization_denied(
        &self,
        tool_call: &ToolCall,
        _context: &ToolExecutionContext,
        reason: DenialReason,
    ) {
        let reason = match reason {
            DenialReason::SubscriptionRequired => "subscription_required",
            DenialReason::QuotaExhausted(_) => "quota_exhausted",
        };
        metrics::counter!(
            "parley_tool_authorization_denied_total",
            "tool_name" => tool_call.name.clone(),
            "reason" => reason
        )
        .increment(1);
    }

    fn on_execution_start(&self, tool_call: &ToolCall, _context: &ToolExecutionContext) {
        metrics::counter!(
            "parley_tool_execution_start_total",
            "tool_name" => tool_call.name.clone()
        )
        .increment(1);
    }

    fn on_execution_success(
        &self,
        tool_call: &ToolCall,
        _context: &ToolExecutionContext,
        result: &ToolExecutionResult,
        elapsed: Duration,
    ) {
        metrics::counter!(
            "parley_tool_execution_success_total",
            "tool_name" => tool_call.name.clone()
        )
        .increment(1);
        metrics::counter!(
            "parley_tool_units_produced_total",
            "tool_name" => tool_call.name.clone()
        )
        .increment(u64::from(result.output.units()));
        metrics::histogram!(
            "parley_tool_execution_duration_seconds",
            "tool_name" => tool_call.name.clone(),
            "status" => "success"
        )
        .record(elapsed.as_secs_f64());
    }

    fn on_execution_failure(
        &self,
        tool_call: &ToolCall,
        _context: &ToolExecutionContext,
        error: &ToolError,
        elapsed: Duration,
    ) {
        metrics::counter!(
            "parley_tool_execution_failure_total",
            "tool_name" => tool_call.name.clone(),
            "error_kind" => format!("{:?}", error.kind)
        )
        .increment(1);
        metrics::histogram!(
            "parley_tool_execution_duration_seconds",
            "tool_name" => tool_call.name.clone(),
            "status" => "failure"
        )
        .record(elapsed.as_secs_f64());
    }
}

impl ExchangeHooks for MetricsObservabilityHooks {
    fn on_exchange_start(&self, _user_id: &UserId) {
        metrics::counter!("parley_exchange_start_total").increment(1);
    }

    fn on_round_complete(&self, _user_id: &UserId, _round: u32, tool_calls: usize) {
        metrics::histogram!("parley_exchange_tool_calls_per_round").record(tool_calls as f64);
    }

    fn on_history_repaired(&self, _user_id: &UserId, removed: usize, mode: RepairMode) {
        metrics::counter!("parley_history_repair_total", "mode" => mode.as_str()).increment(1);
        metrics::counter!("parley_history_turns_removed_total", "mode" => mode.as_str())
            .increment(removed as u64);
    }

    fn on_storage_failure(&self, _user_id: &UserId, _error: &ChatError) {
        metrics::counter!("parley_history_storage_failure_total").increment(1);
    }

    fn on_exchange_complete(&self, _user_id: &UserId, report: &ExchangeReport, elapsed: Duration) {
        let outcome = report.outcome.as_str();
        metrics::counter!("parley_exchange_complete_total", "outcome" => outcome).increment(1);
        metrics::histogram!("parley_exchange_rounds", "outcome" => outcome)
            .record(f64::from(report.rounds));
        metrics::histogram!("parley_exchange_duration_seconds", "outcome" => outcome)
            .record(elapsed.as_secs_f64());
        if report.round_limit_reached {
            metrics::counter!("parley_exchange_round_limit_total").increment(1);
        }
    }
}
