//! How conversation state reaches the provider.
//!
//! A [`StatelessStrategy`] resubmits the whole prompt window every round. A
//! [`StatefulStrategy`] talks to a provider that keeps the thread server-side:
//! it sends only the messages added since the last assistant reply, and first
//! waits for any run left in flight by an earlier exchange to settle.

use std::sync::Arc;
use std::time::Duration;

use futures_timer::Delay;
use pcommon::UserId;

use crate::{
    ModelProvider, ModelRequest, ModelResponse, ProviderError, ProviderFuture, ProviderId, Role,
};

/// Pluggable submission mode used by the exchange orchestrator.
pub trait ConversationStrategy: Send + Sync {
    fn provider_id(&self) -> ProviderId;

    fn submit<'a>(
        &'a self,
        user_id: &'a UserId,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<ModelResponse, ProviderError>>;
}

#[derive(Clone)]
pub struct StatelessStrategy {
    provider: Arc<dyn ModelProvider>,
}

impl StatelessStrategy {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self { provider }
    }
}

impl ConversationStrategy for StatelessStrategy {
    fn provider_id(&self) -> ProviderId {
        self.provider.id()
    }

    fn submit<'a>(
        &'a self,
        _user_id: &'a UserId,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<ModelResponse, ProviderError>> {
        self.provider.complete(request)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteRunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Completed,
    Failed,
    Cancelled,
    Expired,
}

impl RemoteRunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Expired
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRun {
    pub id: String,
    pub status: RemoteRunStatus,
}

/// A provider holding one conversation thread per user.
pub trait RemoteThreadProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    fn active_run<'a>(
        &'a self,
        user_id: &'a UserId,
    ) -> ProviderFuture<'a, Result<Option<RemoteRun>, ProviderError>>;

    fn run_status<'a>(
        &'a self,
        user_id: &'a UserId,
        run_id: &'a str,
    ) -> ProviderFuture<'a, Result<RemoteRunStatus, ProviderError>>;

    fn cancel_run<'a>(
        &'a self,
        user_id: &'a UserId,
        run_id: &'a str,
    ) -> ProviderFuture<'a, Result<(), ProviderError>>;

    /// Appends `request.messages` to the thread and runs it to completion.
    fn continue_thread<'a>(
        &'a self,
        user_id: &'a UserId,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<ModelResponse, ProviderError>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlePolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Total polling budget before a stuck run is cancelled.
    pub ceiling: Duration,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(15),
            ceiling: Duration::from_secs(180),
        }
    }
}

impl SettlePolicy {
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.initial_delay.is_zero() {
            return Err(ProviderError::invalid_request(
                "settle initial_delay must be greater than zero",
            ));
        }

        if self.max_delay < self.initial_delay {
            return Err(ProviderError::invalid_request(
                "settle max_delay must not be shorter than initial_delay",
            ));
        }

        Ok(())
    }
}

/// How a pre-existing run was dealt with before submitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    Idle,
    Settled { polls: u32 },
    Cancelled { polls: u32 },
}

#[derive(Clone)]
pub struct StatefulStrategy {
    remote: Arc<dyn RemoteThreadProvider>,
    settle: SettlePolicy,
}

impl StatefulStrategy {
    pub fn new(remote: Arc<dyn RemoteThreadProvider>) -> Self {
        Self {
            remote,
            settle: SettlePolicy::default(),
        }
    }

    pub fn with_settle_policy(mut self, settle: SettlePolicy) -> Self {
        self.settle = settle;
        self
    }

    pub async fn settle_active_run(&self, user_id: &UserId) -> Result<SettleOutcome, ProviderError> {
        let Some(run) = self.remote.active_run(user_id).await? else {
            return Ok(SettleOutcome::Idle);
        };

        if run.status.is_terminal() {
            return Ok(SettleOutcome::Idle);
        }

        let mut delay = self.settle.initial_delay;
        let mut waited = Duration::ZERO;
        let mut polls = 0_u32;

        while waited < self.settle.ceiling {
            let step = delay.min(self.settle.ceiling - waited);
            Delay::new(step).await;
            waited += step;
            polls += 1;

            let status = self.remote.run_status(user_id, &run.id).await?;
            if status.is_terminal() {
                tracing::debug!(user_id = %user_id, run_id = %run.id, polls, "remote run settled");
                return Ok(SettleOutcome::Settled { polls });
            }

            delay = (delay * 2).min(self.settle.max_delay);
        }

        tracing::warn!(
            user_id = %user_id,
            run_id = %run.id,
            waited_ms = waited.as_millis() as u64,
            "remote run did not settle; cancelling"
        );
        self.remote.cancel_run(user_id, &run.id).await?;
        Ok(SettleOutcome::Cancelled { polls })
    }
}

/// Keeps the messages after the last assistant message; the remote thread
/// already holds everything before it.
fn thread_tail(mut request: ModelRequest) -> ModelRequest {
    if let Some(last_assistant) = request
        .messages
        .iter()
        .rposition(|message| message.role == Role::Assistant)
    {
        request.messages.drain(..=last_assistant);
    }
    request
}

impl ConversationStrategy for StatefulStrategy {
    fn provider_id(&self) -> ProviderId {
        self.remote.id()
    }

    fn submit<'a>(
        &'a self,
        user_id: &'a UserId,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<ModelResponse, ProviderError>> {
        Box::pin(async move {
            self.settle_active_run(user_id).await?;
            let request = thread_tail(request);
            if request.messages.is_empty() {
                return Err(ProviderError::invalid_request(
                    "nothing new to append to the remote thread",
                ));
            }
            self.remote.continue_thread(user_id, request).await
        })
    }
}
