//! Authorizes and executes the tool calls of one provider round.
//!
//! Calls run sequentially. Metered tools are checked against the subscription
//! service before they run, and the service is asked again for every call so
//! no quota figure is ever cached here. A denial or a collaborator rejection
//! ends the round: every remaining call is closed with a `skipped` result so
//! the assistant turn that requested them stays answerable.

use std::collections::HashSet;
use std::sync::Arc;

use pcommon::UserId;
use pprovider::{ToolCall, ToolResult};
use ptooling::{
    Artifact, DefaultToolRuntime, DenialReason, NoopToolRuntimeHooks, QuotaKind,
    ToolErrorKind, ToolExecutionContext, ToolRegistry, ToolRuntime, ToolRuntimeHooks,
};
use serde_json::{Value, json};

use crate::{ChatError, ChatFuture, ErrorClassifier, LogSeverity, TOOL_FAILURE_MESSAGE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionTier {
    Free,
    Standard,
    Premium,
    Unlimited,
}

impl SubscriptionTier {
    pub fn is_paid(self) -> bool {
        !matches!(self, Self::Free)
    }

    pub fn is_unlimited(self) -> bool {
        matches!(self, Self::Unlimited)
    }
}

/// A point-in-time read of a user's subscription, owned by the
/// subscription service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaState {
    pub subscription_tier: SubscriptionTier,
    pub remaining_image_generations: u32,
    pub remaining_video_generations: u32,
}

impl QuotaState {
    pub fn remaining(&self, kind: QuotaKind) -> u32 {
        match kind {
            QuotaKind::Image => self.remaining_image_generations,
            QuotaKind::Video => self.remaining_video_generations,
        }
    }
}

pub trait SubscriptionService: Send + Sync {
    fn get_active_subscription<'a>(
        &'a self,
        user_id: &'a UserId,
    ) -> ChatFuture<'a, Result<Option<QuotaState>, ChatError>>;

    /// Atomically lowers the remaining quota of `kind` by `amount`.
    fn decrement<'a>(
        &'a self,
        user_id: &'a UserId,
        kind: QuotaKind,
        amount: u32,
    ) -> ChatFuture<'a, Result<(), ChatError>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageHandle(pub String);

/// Outbound side of the chat transport. Failures are logged and never affect
/// the exchange.
pub trait MessagingTransport: Send + Sync {
    fn send_progress_message<'a>(
        &'a self,
        user_id: &'a UserId,
        text: &'a str,
    ) -> ChatFuture<'a, Result<MessageHandle, ChatError>>;

    fn delete_message<'a>(&'a self, handle: MessageHandle) -> ChatFuture<'a, Result<(), ChatError>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMessagingTransport;

impl MessagingTransport for NoopMessagingTransport {
    fn send_progress_message<'a>(
        &'a self,
        _user_id: &'a UserId,
        _text: &'a str,
    ) -> ChatFuture<'a, Result<MessageHandle, ChatError>> {
        Box::pin(async { Ok(MessageHandle(String::new())) })
    }

    fn delete_message<'a>(&'a self, _handle: MessageHandle) -> ChatFuture<'a, Result<(), ChatError>> {
        Box::pin(async { Ok(()) })
    }
}

/// The calls of one assistant turn after deduplication. Only
/// [`RoundCalls::dedup`] builds one, so nothing downstream sees duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundCalls {
    calls: Vec<ToolCall>,
    duplicates: Vec<ToolCall>,
}

impl RoundCalls {
    /// Keeps the first call for each `(name, canonical arguments)` pair and
    /// for each call id.
    pub fn dedup(raw: Vec<ToolCall>) -> Self {
        let mut seen_keys = HashSet::new();
        let mut seen_ids = HashSet::new();
        let mut round = Self::default();

        for call in raw {
            let fresh_id = seen_ids.insert(call.id.clone());
            let fresh_key = seen_keys.insert(call.dedup_key());
            if fresh_id && fresh_key {
                round.calls.push(call);
            } else {
                round.duplicates.push(call);
            }
        }

        round
    }

    pub fn calls(&self) -> &[ToolCall] {
        &self.calls
    }

    pub fn duplicates(&self) -> &[ToolCall] {
        &self.duplicates
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCallState {
    Pending,
    Authorizing,
    Executing,
    Completed,
    Denied,
    Failed,
    Rejected,
    Skipped,
}

impl ToolCallState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Authorizing | Self::Executing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRecord {
    pub call: ToolCall,
    pub state: ToolCallState,
    pub result: ToolResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub reason: DenialReason,
    pub tool_call_id: String,
    pub prompt: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundOutcome {
    pub records: Vec<ToolCallRecord>,
    pub artifacts: Vec<Artifact>,
    pub text_candidates: Vec<String>,
    pub denial: Option<Denial>,
    /// User-facing text of a collaborator rejection.
    pub rejection: Option<String>,
    /// Calls that reached the tool runtime.
    pub executed: u32,
}

impl RoundOutcome {
    /// One result per call, in request order.
    pub fn results(&self) -> Vec<ToolResult> {
        self.records.iter().map(|record| record.result.clone()).collect()
    }

    pub fn is_aborted(&self) -> bool {
        self.denial.is_some() || self.rejection.is_some()
    }

    fn close(&mut self, call: &ToolCall, state: ToolCallState, payload: Value) {
        self.records.push(ToolCallRecord {
            call: call.clone(),
            state,
            result: ToolResult::new(call.id.clone(), payload),
        });
    }
}

/// Texts shown to the user when a metered tool is refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPrompts {
    pub subscription_required: String,
    pub image_quota_exhausted: String,
    pub video_quota_exhausted: String,
}

impl Default for DispatchPrompts {
    fn default() -> Self {
        Self {
            subscription_required: "Image and video generation are part of our paid plans. \
                                    Subscribe to start creating."
                .to_string(),
            image_quota_exhausted: "You've used all of your image generations for now. \
                                    Buy more credits to keep creating."
                .to_string(),
            video_quota_exhausted: "You've used all of your video generations for now. \
                                    Buy more credits to keep creating."
                .to_string(),
        }
    }
}

impl DispatchPrompts {
    pub fn for_denial(&self, reason: DenialReason) -> &str {
        match reason {
            DenialReason::SubscriptionRequired => &self.subscription_required,
            DenialReason::QuotaExhausted(QuotaKind::Image) => &self.image_quota_exhausted,
            DenialReason::QuotaExhausted(QuotaKind::Video) => &self.video_quota_exhausted,
        }
    }
}

fn denial_payload(reason: DenialReason, prompt: &str) -> Value {
    let (reason, resource) = match reason {
        DenialReason::SubscriptionRequired => ("subscription_required", Value::Null),
        DenialReason::QuotaExhausted(kind) => ("quota_exhausted", json!(kind.as_str())),
    };

    json!({
        "status": "denied",
        "reason": reason,
        "resource": resource,
        "message": prompt,
    })
}

fn skipped_payload() -> Value {
    json!({"status": "skipped"})
}

fn text_candidate(artifact: &Artifact) -> Option<String> {
    match artifact {
        Artifact::SearchAnswer(answer) => Some(answer.clone()),
        Artifact::NotificationScheduled { when, text, .. } => {
            Some(format!("Done! I'll remind you at {when}: {text}"))
        }
        _ => None,
    }
}

enum Authorization {
    /// `None` when the tier is unlimited.
    Granted { remaining: Option<u32> },
    Denied(DenialReason),
}

#[derive(Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    runtime: Arc<dyn ToolRuntime>,
    subscriptions: Arc<dyn SubscriptionService>,
    transport: Arc<dyn MessagingTransport>,
    hooks: Arc<dyn ToolRuntimeHooks>,
    prompts: DispatchPrompts,
    classifier: ErrorClassifier,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, subscriptions: Arc<dyn SubscriptionService>) -> Self {
        Self {
            runtime: Arc::new(DefaultToolRuntime::new(Arc::clone(&registry))),
            registry,
            subscriptions,
            transport: Arc::new(NoopMessagingTransport),
            hooks: Arc::new(NoopToolRuntimeHooks),
            prompts: DispatchPrompts::default(),
            classifier: ErrorClassifier,
        }
    }

    pub fn with_runtime(mut self, runtime: Arc<dyn ToolRuntime>) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn MessagingTransport>) -> Self {
        self.transport = transport;
        self
    }

    /// Hooks notified about authorization denials. Execution events are
    /// reported by the runtime's own hooks.
    pub fn with_hooks(mut self, hooks: Arc<dyn ToolRuntimeHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_prompts(mut self, prompts: DispatchPrompts) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub async fn dispatch_round(
        &self,
        round: &RoundCalls,
        context: &ToolExecutionContext,
    ) -> RoundOutcome {
        let mut outcome = RoundOutcome::default();
        let mut progress_sent = false;
        let mut progress_handle = None;

        for call in round.calls() {
            if outcome.is_aborted() {
                outcome.close(call, ToolCallState::Skipped, skipped_payload());
                continue;
            }

            let quota_kind = self.registry.gate(&call.name).quota_kind();
            let mut clamped = None;
            if let Some(kind) = quota_kind {
                match self.authorize(&context.user_id, kind).await {
                    Ok(Authorization::Granted { remaining }) => {
                        clamped = remaining.and_then(|remaining| self.clamp_units(call, remaining));
                    }
                    Ok(Authorization::Denied(reason)) => {
                        self.hooks.on_authorization_denied(call, context, reason);
                        let prompt = self.prompts.for_denial(reason).to_string();
                        tracing::info!(
                            phase = "authorization",
                            event = "denied",
                            user_id = %context.user_id,
                            tool_name = %call.name,
                            tool_call_id = %call.id,
                            reason = ?reason,
                            "metered tool call denied"
                        );
                        outcome.close(call, ToolCallState::Denied, denial_payload(reason, &prompt));
                        outcome.denial = Some(Denial {
                            reason,
                            tool_call_id: call.id.clone(),
                            prompt,
                        });
                        continue;
                    }
                    Err(error) => {
                        tracing::error!(
                            phase = "authorization",
                            user_id = %context.user_id,
                            tool_name = %call.name,
                            error_kind = ?error.kind,
                            detail = %error.message,
                            "subscription lookup failed"
                        );
                        outcome.close(
                            call,
                            ToolCallState::Failed,
                            json!({"status": "failed", "message": TOOL_FAILURE_MESSAGE}),
                        );
                        continue;
                    }
                }
            }

            if !progress_sent {
                progress_sent = true;
                progress_handle = self.send_progress(&context.user_id, call).await;
            }

            outcome.executed += 1;
            match self.runtime.execute(clamped.as_ref().unwrap_or(call), context).await {
                Ok(result) => {
                    if let Some(kind) = quota_kind {
                        self.charge(&context.user_id, kind, result.output.units()).await;
                    }
                    if let Some(artifact) = result.output.artifact.clone() {
                        outcome.text_candidates.extend(text_candidate(&artifact));
                        outcome.artifacts.push(artifact);
                    }
                    outcome.records.push(ToolCallRecord {
                        call: call.clone(),
                        state: ToolCallState::Completed,
                        result: result.to_tool_result(),
                    });
                }
                Err(error) if error.kind == ToolErrorKind::Rejected => {
                    tracing::info!(
                        phase = "tooling",
                        event = "rejected",
                        user_id = %context.user_id,
                        tool_name = %call.name,
                        tool_call_id = %call.id,
                        "tool call rejected by collaborator"
                    );
                    outcome.close(
                        call,
                        ToolCallState::Rejected,
                        json!({"status": "rejected", "message": error.message}),
                    );
                    outcome.rejection = Some(error.message);
                }
                Err(error) => {
                    let classification = self.classifier.classify_tool(&error);
                    match classification.log_severity {
                        LogSeverity::Warn => tracing::warn!(
                            phase = "tooling",
                            tool_name = %call.name,
                            tool_call_id = %call.id,
                            error_kind = ?error.kind,
                            detail = %error.message,
                            "tool call failed"
                        ),
                        LogSeverity::Error => tracing::error!(
                            phase = "tooling",
                            tool_name = %call.name,
                            tool_call_id = %call.id,
                            error_kind = ?error.kind,
                            detail = %error.message,
                            "tool call failed"
                        ),
                    }
                    let message = if error.is_user_error() {
                        error.message
                    } else {
                        classification.user_message.to_string()
                    };
                    outcome.close(
                        call,
                        ToolCallState::Failed,
                        json!({"status": "failed", "message": message}),
                    );
                }
            }
        }

        if let Some(handle) = progress_handle
            && let Err(error) = self.transport.delete_message(handle).await
        {
            tracing::warn!(
                phase = "tooling",
                user_id = %context.user_id,
                detail = %error.message,
                "failed to delete progress message"
            );
        }

        outcome
    }

    async fn authorize(
        &self,
        user_id: &UserId,
        kind: QuotaKind,
    ) -> Result<Authorization, ChatError> {
        let Some(state) = self.subscriptions.get_active_subscription(user_id).await? else {
            return Ok(Authorization::Denied(DenialReason::SubscriptionRequired));
        };
        if !state.subscription_tier.is_paid() {
            return Ok(Authorization::Denied(DenialReason::SubscriptionRequired));
        }
        if state.subscription_tier.is_unlimited() {
            return Ok(Authorization::Granted { remaining: None });
        }
        match state.remaining(kind) {
            0 => Ok(Authorization::Denied(DenialReason::QuotaExhausted(kind))),
            remaining => Ok(Authorization::Granted {
                remaining: Some(remaining),
            }),
        }
    }

    /// A copy of `call` whose units argument is lowered to `remaining`, or
    /// `None` when the call already fits.
    fn clamp_units(&self, call: &ToolCall, remaining: u32) -> Option<ToolCall> {
        let argument = self.registry.units_argument(&call.name)?;
        let requested = call.arguments.get(argument).and_then(Value::as_u64)?;
        if requested <= u64::from(remaining) {
            return None;
        }

        tracing::debug!(
            phase = "authorization",
            tool_name = %call.name,
            tool_call_id = %call.id,
            requested,
            remaining,
            "units clamped to the remaining quota"
        );
        let mut clamped = call.clone();
        clamped
            .arguments
            .insert(argument.to_string(), Value::from(remaining));
        Some(clamped)
    }

    async fn charge(&self, user_id: &UserId, kind: QuotaKind, units: u32) {
        if units == 0 {
            return;
        }
        if let Err(error) = self.subscriptions.decrement(user_id, kind, units).await {
            tracing::error!(
                phase = "authorization",
                user_id = %user_id,
                quota = kind.as_str(),
                units,
                detail = %error.message,
                "quota decrement failed after a completed generation"
            );
        }
    }

    async fn send_progress(&self, user_id: &UserId, call: &ToolCall) -> Option<MessageHandle> {
        let label = self
            .registry
            .get(&call.name)
            .map(|tool| tool.progress_label())
            .unwrap_or_else(|| "Working on it...".to_string());

        match self.transport.send_progress_message(user_id, &label).await {
            Ok(handle) => Some(handle),
            Err(error) => {
                tracing::warn!(
                    phase = "tooling",
                    user_id = %user_id,
                    detail = %error.message,
                    "failed to send progress message"
                );
                None
            }
        }
    }
}
