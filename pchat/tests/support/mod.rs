#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pchat::prelude::*;
use pchat::{ChatFuture, MessageHandle};
use pcommon::BoxFuture;
use pprovider::{
    ConversationStrategy, Message, ModelRequest, ModelResponse, OutputItem, ProviderError,
    ProviderFuture, ProviderId, RetryPolicy, Role, StopReason, TokenUsage, ToolArguments,
    ToolCall,
};
use ptooling::ToolError;
use ptooling::builtin::{
    AddNotificationTool, GenerateImageTool, ImageGenerator, InMemoryNotificationStore,
    SearchWebTool, WebSearch,
};
use serde_json::Value;
use tokio::sync::Notify;

pub fn args(value: Value) -> ToolArguments {
    value.as_object().cloned().expect("object literal")
}

pub fn call(id: &str, name: &str, arguments: Value) -> ToolCall {
    ToolCall::new(id, name, args(arguments))
}

pub fn text_response(text: &str) -> ModelResponse {
    ModelResponse {
        provider: ProviderId::Scripted,
        model: "scripted".to_string(),
        output: vec![OutputItem::Message(Message::new(Role::Assistant, text))],
        stop_reason: StopReason::EndTurn,
        usage: TokenUsage::default(),
    }
}

pub fn calls_response(calls: Vec<ToolCall>) -> ModelResponse {
    ModelResponse {
        provider: ProviderId::Scripted,
        model: "scripted".to_string(),
        output: vec![OutputItem::Message(Message::assistant("", calls))],
        stop_reason: StopReason::ToolUse,
        usage: TokenUsage::default(),
    }
}

/// Replays canned provider results in order and records every request.
#[derive(Default)]
pub struct ScriptedStrategy {
    responses: Mutex<VecDeque<Result<ModelResponse, ProviderError>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedStrategy {
    pub fn new(responses: Vec<Result<ModelResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl ConversationStrategy for ScriptedStrategy {
    fn provider_id(&self) -> ProviderId {
        ProviderId::Scripted
    }

    fn submit<'a>(
        &'a self,
        _user_id: &'a UserId,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<ModelResponse, ProviderError>> {
        Box::pin(async move {
            self.requests.lock().expect("requests lock").push(request);
            self.responses
                .lock()
                .expect("responses lock")
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::other("script exhausted")))
        })
    }
}

/// Answers every request with an echo of the latest human text; the first
/// request from `blocked_user` waits until [`GatedStrategy::open`] is called.
pub struct GatedStrategy {
    blocked_user: UserId,
    blocked_once: AtomicBool,
    pub entered: Notify,
    release: Notify,
}

impl GatedStrategy {
    pub fn new(blocked_user: impl Into<UserId>) -> Self {
        Self {
            blocked_user: blocked_user.into(),
            blocked_once: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    pub fn open(&self) {
        self.release.notify_one();
    }
}

impl ConversationStrategy for GatedStrategy {
    fn provider_id(&self) -> ProviderId {
        ProviderId::Scripted
    }

    fn submit<'a>(
        &'a self,
        user_id: &'a UserId,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<ModelResponse, ProviderError>> {
        Box::pin(async move {
            if *user_id == self.blocked_user && !self.blocked_once.swap(true, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }

            let latest = request
                .messages
                .iter()
                .rev()
                .find(|message| message.role == Role::Human)
                .map(Message::text)
                .unwrap_or_default();
            Ok(text_response(&format!("re: {latest}")))
        })
    }
}

pub struct FakeSubscriptions {
    state: Mutex<Option<QuotaState>>,
    lookups: AtomicUsize,
    decrements: Mutex<Vec<(QuotaKind, u32)>>,
}

impl FakeSubscriptions {
    pub fn new(state: Option<QuotaState>) -> Self {
        Self {
            state: Mutex::new(state),
            lookups: AtomicUsize::new(0),
            decrements: Mutex::new(Vec::new()),
        }
    }

    pub fn tier(tier: SubscriptionTier, images: u32, videos: u32) -> Self {
        Self::new(Some(QuotaState {
            subscription_tier: tier,
            remaining_image_generations: images,
            remaining_video_generations: videos,
        }))
    }

    pub fn state(&self) -> Option<QuotaState> {
        *self.state.lock().expect("state lock")
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn decrements(&self) -> Vec<(QuotaKind, u32)> {
        self.decrements.lock().expect("decrements lock").clone()
    }
}

impl SubscriptionService for FakeSubscriptions {
    fn get_active_subscription<'a>(
        &'a self,
        _user_id: &'a UserId,
    ) -> ChatFuture<'a, Result<Option<QuotaState>, ChatError>> {
        Box::pin(async move {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self.state())
        })
    }

    fn decrement<'a>(
        &'a self,
        _user_id: &'a UserId,
        kind: QuotaKind,
        amount: u32,
    ) -> ChatFuture<'a, Result<(), ChatError>> {
        Box::pin(async move {
            self.decrements
                .lock()
                .expect("decrements lock")
                .push((kind, amount));
            if let Some(state) = self.state.lock().expect("state lock").as_mut() {
                match kind {
                    QuotaKind::Image => {
                        state.remaining_image_generations =
                            state.remaining_image_generations.saturating_sub(amount);
                    }
                    QuotaKind::Video => {
                        state.remaining_video_generations =
                            state.remaining_video_generations.saturating_sub(amount);
                    }
                }
            }
            Ok(())
        })
    }
}

#[derive(Default)]
pub struct CountingGenerator {
    calls: Mutex<Vec<(String, u32)>>,
    failure: Option<String>,
}

impl CountingGenerator {
    pub fn failing(message: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failure: Some(message.to_string()),
        }
    }

    pub fn calls(&self) -> Vec<(String, u32)> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl ImageGenerator for CountingGenerator {
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        count: u32,
    ) -> BoxFuture<'a, Result<Vec<Vec<u8>>, ToolError>> {
        Box::pin(async move {
            self.calls
                .lock()
                .expect("calls lock")
                .push((prompt.to_string(), count));
            if let Some(message) = &self.failure {
                return Err(ToolError::execution(message.clone()));
            }
            Ok((0..count).map(|index| vec![0x89, index as u8]).collect())
        })
    }
}

#[derive(Default)]
pub struct FakeSearch {
    queries: Mutex<Vec<String>>,
}

impl FakeSearch {
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().expect("queries lock").clone()
    }
}

impl WebSearch for FakeSearch {
    fn search<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<String, ToolError>> {
        Box::pin(async move {
            self.queries
                .lock()
                .expect("queries lock")
                .push(query.to_string());
            Ok(format!("answer for {query}"))
        })
    }
}

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<String>>,
    deleted: AtomicUsize,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().expect("sent lock").clone()
    }

    pub fn deleted(&self) -> usize {
        self.deleted.load(Ordering::SeqCst)
    }
}

impl MessagingTransport for RecordingTransport {
    fn send_progress_message<'a>(
        &'a self,
        _user_id: &'a UserId,
        text: &'a str,
    ) -> ChatFuture<'a, Result<MessageHandle, ChatError>> {
        Box::pin(async move {
            let mut sent = self.sent.lock().expect("sent lock");
            sent.push(text.to_string());
            Ok(MessageHandle(format!("msg-{}", sent.len())))
        })
    }

    fn delete_message<'a>(&'a self, _handle: MessageHandle) -> ChatFuture<'a, Result<(), ChatError>> {
        Box::pin(async move {
            self.deleted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// Loads nothing and refuses every write.
pub struct FailingStore;

impl HistoryStore for FailingStore {
    fn append<'a>(&'a self, _turn: ConversationTurn) -> ChatFuture<'a, Result<(), ChatError>> {
        Box::pin(async { Err(ChatError::storage("disk full")) })
    }

    fn load<'a>(
        &'a self,
        _user_id: &'a UserId,
        _window: usize,
    ) -> ChatFuture<'a, Result<Vec<ConversationTurn>, ChatError>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn clear<'a>(&'a self, _user_id: &'a UserId) -> ChatFuture<'a, Result<(), ChatError>> {
        Box::pin(async { Ok(()) })
    }
}

pub struct Fixture {
    pub generator: Arc<CountingGenerator>,
    pub search: Arc<FakeSearch>,
    pub notifications: Arc<InMemoryNotificationStore>,
    pub subscriptions: Arc<FakeSubscriptions>,
    pub transport: Arc<RecordingTransport>,
    pub store: Arc<InMemoryHistoryStore>,
}

impl Fixture {
    pub fn new(subscriptions: FakeSubscriptions) -> Self {
        Self::with_generator(subscriptions, CountingGenerator::default())
    }

    pub fn with_generator(subscriptions: FakeSubscriptions, generator: CountingGenerator) -> Self {
        Self {
            generator: Arc::new(generator),
            search: Arc::new(FakeSearch::default()),
            notifications: Arc::new(InMemoryNotificationStore::default()),
            subscriptions: Arc::new(subscriptions),
            transport: Arc::new(RecordingTransport::default()),
            store: Arc::new(InMemoryHistoryStore::new()),
        }
    }

    pub fn registry(&self) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(GenerateImageTool::new(self.generator.clone()));
        registry.register(SearchWebTool::new(self.search.clone()));
        registry.register(AddNotificationTool::new(self.notifications.clone()));
        registry
    }

    pub fn dispatcher(&self) -> ToolDispatcher {
        ToolDispatcher::new(Arc::new(self.registry()), self.subscriptions.clone())
            .with_transport(self.transport.clone())
    }

    pub fn policy() -> ExchangePolicy {
        ExchangePolicy::new("scripted-model")
            .with_system_prompt("You are a helpful assistant.")
            .with_retry(RetryPolicy::new(3).with_backoff(Duration::ZERO, Duration::ZERO))
    }

    pub fn orchestrator(&self, strategy: Arc<dyn ConversationStrategy>) -> ExchangeOrchestrator {
        self.orchestrator_with(strategy, Self::policy())
    }

    pub fn orchestrator_with(
        &self,
        strategy: Arc<dyn ConversationStrategy>,
        policy: ExchangePolicy,
    ) -> ExchangeOrchestrator {
        ExchangeOrchestrator::builder(strategy, self.dispatcher())
            .history_store(self.store.clone())
            .policy(policy)
            .build()
            .expect("orchestrator config is valid")
    }

    pub fn log(&self, user: &str) -> Vec<ConversationTurn> {
        self.store
            .snapshot(&UserId::from(user))
            .expect("store readable")
    }
}
