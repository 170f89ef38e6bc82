//! Drives one exchange: lock, history window, provider rounds, tool rounds,
//! final answer.
//!
//! The per-user lock is held from the first history read to the last append.
//! Provider rounds are capped by [`ExchangePolicy::max_tool_round_trips`] and
//! every round re-offers the same tool schema.

use std::mem;
use std::sync::Arc;
use std::time::Instant;

use futures_timer::Delay;
use pcommon::{TraceId, UserId};
use pprovider::{
    ConversationStrategy, Message, ModelRequest, ModelResponse, NoopOperationHooks,
    ProviderError, ProviderErrorKind, ProviderOperationHooks, Role, ToolDefinition,
    execute_with_retry,
};
use ptooling::{DenialReason, ToolExecutionContext};
use uuid::Uuid;

use crate::{
    Answer, ChatError, ConversationLock, ConversationTurn, ErrorClassifier, ExchangeHooks,
    ExchangeOutcome, ExchangePolicy, ExchangeReport, HistoryStore, InMemoryHistoryStore,
    InboundMessage, NoopExchangeHooks, PendingExchange, RepairMode, RoundCalls, ToolDispatcher,
    TurnBudget, TurnBuilder, TurnRole, repair_history, strip_tool_turns,
};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// How far malformed-history recovery has gone in the current exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recovery {
    None,
    Repaired,
    Stripped,
}

/// Mutable state of one exchange.
struct ExchangeRun {
    user_id: UserId,
    history: Vec<ConversationTurn>,
    current: Message,
    produced: Vec<ConversationTurn>,
    pending: PendingExchange,
    recovery: Recovery,
    rounds: u32,
    executed_tool_calls: u32,
    duplicate_tool_calls: u32,
    history_repairs: u32,
    storage_failures: u32,
    round_limit_reached: bool,
}

impl ExchangeRun {
    fn into_report(self, outcome: ExchangeOutcome) -> ExchangeReport {
        ExchangeReport {
            outcome,
            rounds: self.rounds,
            executed_tool_calls: self.executed_tool_calls,
            duplicate_tool_calls: self.duplicate_tool_calls,
            history_repairs: self.history_repairs,
            storage_failures: self.storage_failures,
            round_limit_reached: self.round_limit_reached,
        }
    }
}

pub struct ExchangeOrchestratorBuilder {
    strategy: Arc<dyn ConversationStrategy>,
    dispatcher: ToolDispatcher,
    store: Arc<dyn HistoryStore>,
    lock: ConversationLock,
    policy: ExchangePolicy,
    turn_budget: TurnBudget,
    hooks: Arc<dyn ExchangeHooks>,
    provider_hooks: Arc<dyn ProviderOperationHooks>,
}

impl ExchangeOrchestratorBuilder {
    pub fn new(strategy: Arc<dyn ConversationStrategy>, dispatcher: ToolDispatcher) -> Self {
        Self {
            strategy,
            dispatcher,
            store: Arc::new(InMemoryHistoryStore::new()),
            lock: ConversationLock::default(),
            policy: ExchangePolicy::new(DEFAULT_MODEL),
            turn_budget: TurnBudget::default(),
            hooks: Arc::new(NoopExchangeHooks),
            provider_hooks: Arc::new(NoopOperationHooks),
        }
    }

    pub fn history_store(mut self, store: Arc<dyn HistoryStore>) -> Self {
        self.store = store;
        self
    }

    pub fn lock(mut self, lock: ConversationLock) -> Self {
        self.lock = lock;
        self
    }

    pub fn policy(mut self, policy: ExchangePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn turn_budget(mut self, turn_budget: TurnBudget) -> Self {
        self.turn_budget = turn_budget;
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn ExchangeHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn provider_hooks(mut self, provider_hooks: Arc<dyn ProviderOperationHooks>) -> Self {
        self.provider_hooks = provider_hooks;
        self
    }

    pub fn build(self) -> Result<ExchangeOrchestrator, ChatError> {
        self.policy.validate()?;
        self.turn_budget.validate()?;
        self.lock.policy().validate()?;

        let tool_schema = self.dispatcher.registry().definitions();

        Ok(ExchangeOrchestrator {
            strategy: self.strategy,
            dispatcher: self.dispatcher,
            store: self.store,
            lock: self.lock,
            policy: self.policy,
            turn_builder: TurnBuilder::new(self.turn_budget),
            hooks: self.hooks,
            provider_hooks: self.provider_hooks,
            classifier: ErrorClassifier,
            tool_schema,
        })
    }
}

pub struct ExchangeOrchestrator {
    strategy: Arc<dyn ConversationStrategy>,
    dispatcher: ToolDispatcher,
    store: Arc<dyn HistoryStore>,
    lock: ConversationLock,
    policy: ExchangePolicy,
    turn_builder: TurnBuilder,
    hooks: Arc<dyn ExchangeHooks>,
    provider_hooks: Arc<dyn ProviderOperationHooks>,
    classifier: ErrorClassifier,
    tool_schema: Vec<ToolDefinition>,
}

impl ExchangeOrchestrator {
    pub fn builder(
        strategy: Arc<dyn ConversationStrategy>,
        dispatcher: ToolDispatcher,
    ) -> ExchangeOrchestratorBuilder {
        ExchangeOrchestratorBuilder::new(strategy, dispatcher)
    }

    pub fn policy(&self) -> &ExchangePolicy {
        &self.policy
    }

    pub fn lock(&self) -> &ConversationLock {
        &self.lock
    }

    pub fn tool_schema(&self) -> &[ToolDefinition] {
        &self.tool_schema
    }

    /// Runs one exchange to a terminal outcome.
    ///
    /// Input that cannot be turned into a provider request and a lock that
    /// cannot be acquired are returned as errors; everything after that ends
    /// in an [`ExchangeReport`].
    pub async fn run_exchange(&self, message: InboundMessage) -> Result<ExchangeReport, ChatError> {
        let started = Instant::now();
        let built = self.turn_builder.build(&message)?;
        let user_id = message.user_id;
        let guard = self.lock.acquire(&user_id).await?;
        self.hooks.on_exchange_start(&user_id);

        let trace_id = TraceId::new(Uuid::new_v4().to_string());
        let context = ToolExecutionContext::new(user_id.clone())
            .with_trace_id(trace_id.clone())
            .with_attachments(built.attachments);

        let mut run = ExchangeRun {
            user_id: user_id.clone(),
            history: Vec::new(),
            current: Message::with_parts(Role::Human, built.parts),
            produced: Vec::new(),
            pending: PendingExchange::default(),
            recovery: Recovery::None,
            rounds: 0,
            executed_tool_calls: 0,
            duplicate_tool_calls: 0,
            history_repairs: 0,
            storage_failures: 0,
            round_limit_reached: false,
        };

        run.history = match self.store.load(&user_id, self.policy.history_window).await {
            Ok(turns) => align_window(turns),
            Err(error) => {
                self.record_storage_failure(&mut run, &error);
                Vec::new()
            }
        };
        self.persist(&mut run, ConversationTurn::human(user_id.clone(), built.persisted_text))
            .await;

        let outcome = self.drive(&mut run, &context).await;
        let report = run.into_report(outcome);
        let elapsed = started.elapsed();

        tracing::info!(
            phase = "exchange",
            event = "complete",
            user_id = %user_id,
            trace_id = %trace_id,
            rounds = report.rounds,
            executed_tool_calls = report.executed_tool_calls,
            outcome = report.outcome.as_str(),
            elapsed_ms = elapsed.as_millis() as u64,
            "exchange finished"
        );
        self.hooks.on_exchange_complete(&user_id, &report, elapsed);
        guard.release();

        Ok(report)
    }

    /// Deletes the whole conversation log of `user_id`, waiting for any
    /// exchange in flight.
    pub async fn clear_conversation(&self, user_id: &UserId) -> Result<(), ChatError> {
        let _guard = self.lock.acquire(user_id).await?;
        self.store.clear(user_id).await
    }

    async fn drive(
        &self,
        run: &mut ExchangeRun,
        context: &ToolExecutionContext,
    ) -> ExchangeOutcome {
        let max_rounds = self.policy.max_tool_round_trips;

        for round in 1..=max_rounds {
            run.rounds = round;
            let response = match self.submit_round(run).await {
                Ok(response) => response,
                Err(error) => return self.fail(&error),
            };
            let (text, raw_calls) = response.into_parts();

            if raw_calls.is_empty() || round == max_rounds {
                if !raw_calls.is_empty() {
                    run.round_limit_reached = true;
                    tracing::warn!(
                        phase = "exchange",
                        user_id = %run.user_id,
                        round,
                        dropped_tool_calls = raw_calls.len(),
                        "tool round limit reached"
                    );
                }
                let answer = mem::take(&mut run.pending).into_answer(&text);
                let turn = ConversationTurn::assistant(
                    run.user_id.clone(),
                    answer.text.clone(),
                    Vec::new(),
                );
                self.persist(run, turn).await;
                return ExchangeOutcome::Answered(answer);
            }

            let calls = RoundCalls::dedup(raw_calls);
            run.duplicate_tool_calls += calls.duplicates().len() as u32;
            let assistant =
                ConversationTurn::assistant(run.user_id.clone(), text, calls.calls().to_vec());
            self.persist(run, assistant.clone()).await;
            run.produced.push(assistant);

            let outcome = self.dispatcher.dispatch_round(&calls, context).await;
            run.executed_tool_calls += outcome.executed;
            for result in outcome.results() {
                let turn = ConversationTurn::tool(run.user_id.clone(), &result);
                self.persist(run, turn.clone()).await;
                run.produced.push(turn);
            }
            self.hooks.on_round_complete(&run.user_id, round, calls.len());
            run.pending.absorb(outcome.artifacts, outcome.text_candidates);

            if let Some(denial) = outcome.denial {
                let turn = ConversationTurn::assistant(
                    run.user_id.clone(),
                    denial.prompt.clone(),
                    Vec::new(),
                );
                self.persist(run, turn).await;
                return match denial.reason {
                    DenialReason::SubscriptionRequired => ExchangeOutcome::DeniedBySubscription {
                        prompt: denial.prompt,
                    },
                    DenialReason::QuotaExhausted(kind) => ExchangeOutcome::DeniedByQuota {
                        kind,
                        prompt: denial.prompt,
                    },
                };
            }

            if let Some(rejection) = outcome.rejection {
                let turn =
                    ConversationTurn::assistant(run.user_id.clone(), rejection.clone(), Vec::new());
                self.persist(run, turn).await;
                return ExchangeOutcome::Answered(Answer::text(rejection));
            }
        }

        // `max_tool_round_trips` is validated to be at least one, so the loop
        // always returns.
        self.fail(&ChatError::invalid_request("no provider round was attempted"))
    }

    /// Submits the current window, applying one repair and then one strip when
    /// the provider rejects the history as malformed.
    async fn submit_round(&self, run: &mut ExchangeRun) -> Result<ModelResponse, ChatError> {
        loop {
            let request = self.build_request(run)?;
            let error = match self.submit_with_retry(&run.user_id, request).await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };

            if error.kind != ProviderErrorKind::MalformedHistory {
                return Err(error.into());
            }

            let (outcome, mode) = match run.recovery {
                Recovery::None => {
                    run.recovery = Recovery::Repaired;
                    (repair_history(mem::take(&mut run.history)), RepairMode::Repair)
                }
                Recovery::Repaired => {
                    run.recovery = Recovery::Stripped;
                    (strip_tool_turns(mem::take(&mut run.history)), RepairMode::Strip)
                }
                Recovery::Stripped => return Err(error.into()),
            };

            tracing::warn!(
                phase = "history",
                event = "repair",
                user_id = %run.user_id,
                mode = mode.as_str(),
                removed = outcome.removed,
                detail = %error.message,
                "provider rejected history; retrying with a rewritten window"
            );
            run.history_repairs += 1;
            self.hooks.on_history_repaired(&run.user_id, outcome.removed, mode);
            run.history = outcome.turns;
        }
    }

    fn build_request(&self, run: &ExchangeRun) -> Result<ModelRequest, ChatError> {
        let mut builder = ModelRequest::builder(self.policy.model.clone())
            .messages(run.history.iter().map(ConversationTurn::to_message))
            .message(run.current.clone())
            .messages(run.produced.iter().map(ConversationTurn::to_message))
            .tools(self.tool_schema.clone())
            .options(self.policy.options.clone())
            .metadata("user_id", run.user_id.as_str());
        if let Some(system_prompt) = &self.policy.system_prompt {
            builder = builder.system(system_prompt.clone());
        }

        Ok(builder.build()?)
    }

    async fn submit_with_retry(
        &self,
        user_id: &UserId,
        request: ModelRequest,
    ) -> Result<ModelResponse, ProviderError> {
        execute_with_retry(
            self.strategy.provider_id(),
            "submit",
            &self.policy.retry,
            self.provider_hooks.as_ref(),
            |_attempt| self.strategy.submit(user_id, request.clone()),
            Delay::new,
        )
        .await
    }

    async fn persist(&self, run: &mut ExchangeRun, turn: ConversationTurn) {
        if let Err(error) = self.store.append(turn).await {
            self.record_storage_failure(run, &error);
        }
    }

    fn record_storage_failure(&self, run: &mut ExchangeRun, error: &ChatError) {
        run.storage_failures += 1;
        tracing::warn!(
            phase = "history",
            event = "storage_failure",
            user_id = %run.user_id,
            error_kind = ?error.kind,
            detail = %error.message,
            "history storage failed; continuing in memory"
        );
        self.hooks.on_storage_failure(&run.user_id, error);
    }

    fn fail(&self, error: &ChatError) -> ExchangeOutcome {
        let classification = self.classifier.report(error);
        ExchangeOutcome::Failed {
            message: classification.user_message.to_string(),
            kind: error.kind,
        }
    }
}

/// A bounded window can start inside a tool group; those leading tool turns
/// have no assistant turn left to answer.
fn align_window(mut turns: Vec<ConversationTurn>) -> Vec<ConversationTurn> {
    let leading = turns
        .iter()
        .take_while(|turn| turn.role == TurnRole::Tool)
        .count();
    turns.drain(..leading);
    turns
}
