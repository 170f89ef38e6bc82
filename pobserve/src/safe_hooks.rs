use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use pchat::{ChatError, ExchangeHooks, ExchangeReport, RepairMode};
use pcommon::UserId;
use pprovider::{ProviderError, ProviderId, ProviderOperationHooks, ToolCall};
use ptooling::{
    DenialReason, ToolError, ToolExecutionContext, ToolExecutionResult, ToolRuntimeHooks,
};

pub struct SafeProviderHooks<H> {
    inner: H,
}

impl<H> SafeProviderHooks<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

impl<H> ProviderOperationHooks for SafeProviderHooks<H>
where
    H: ProviderOperationHooks,
{
    fn on_attempt_start(&self, provider: ProviderId, operation: &str, attempt: u32) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_attempt_start(provider, operation, attempt)
        }));
    }

    fn on_retry_scheduled(
        &self,
        provider: ProviderId,
        operation: &str,
        attempt: u32,
        delay: Duration,
        error: &ProviderError,
    ) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner
                .on_retry_scheduled(provider, operation, attempt, delay, error)
        }));
    }

    fn on_success(&self, provider: ProviderId, operation: &str, attempts: u32) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_success(provider, operation, attempts)
        }));
    }

    fn on_failure(
        &self,
        provider: ProviderId,
        operation: &str,
        attempts: u32,
        error: &ProviderError,
    ) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_failure(provider, operation, attempts, error)
        }));
    }
}

pub struct SafeToolHooks<H> {
    inner: H,
}

impl<H> SafeToolHooks<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

impl<H> ToolRuntimeHooks for SafeToolHooks<H>
where
    H: ToolRuntimeHooks,
{
    fn on_authorization_denied(
        &self,
        tool_call: &ToolCall,
        context: &ToolExecutionContext,
        reason: DenialReason,
    ) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner
                .on_authorization_denied(tool_call, context, reason)
        }));
    }

    fn on_execution_start(&self, tool_call: &ToolCall, context: &ToolExecutionContext) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_execution_start(tool_call, context)
        }));
    }

    fn on_execution_success(
        &self,
        tool_call: &ToolCall,
        context: &ToolExecutionContext,
        result: &ToolExecutionResult,
        elapsed: Duration,
    ) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner
                .on_execution_success(tool_call, context, result, elapsed)
        }));
    }

    fn on_execution_failure(
        &self,
        tool_call: &ToolCall,
        context: &ToolExecutionContext,
        error: &ToolError,
        elapsed: Duration,
    ) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner
                .on_execution_failure(tool_call, context, error, elapsed)
        }));
    }
}

/// Swallows panics raised by the wrapped exchange hooks.
pub struct SafeExchangeHooks<H> {
    inner: H,
}

impl<H> SafeExchangeHooks<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

impl<H> ExchangeHooks for SafeExchangeHooks<H>
where
    H: ExchangeHooks,
{
    fn on_exchange_start(&self, user_id: &UserId) {
        let _ = catch_unwind(AssertUnwindSafe(|| self.inner.on_exchange_start(user_id)));
    }

    fn on_round_complete(&self, user_id: &UserId, round: u32, tool_calls: usize) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_round_complete(user_id, round, tool_calls)
        }));
    }

    fn on_history_repaired(&self, user_id: &UserId, removed: usize, mode: RepairMode) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_history_repaired(user_id, removed, mode)
        }));
    }

    fn on_storage_failure(&self, user_id: &UserId, error: &ChatError) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_storage_failure(user_id, error)
        }));
    }

    fn on_exchange_complete(&self, user_id: &UserId, report: &ExchangeReport, elapsed: Duration) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_exchange_complete(user_id, report, elapsed)
        }));
    }
}
