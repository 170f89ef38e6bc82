//! Wires configuration, history storage, observability hooks and the tool
//! dispatcher into a ready [`ExchangeOrchestrator`].

use std::sync::Arc;

use pchat::{
    ConversationLock, ExchangeHooks, ExchangeOrchestrator, HistoryStore, MessagingTransport,
    SubscriptionService, ToolDispatcher,
};
use pmemory::create_history_store;
use pobserve::{
    MetricsObservabilityHooks, SafeExchangeHooks, SafeProviderHooks, SafeToolHooks,
    TracingObservabilityHooks,
};
use pprovider::{ConversationStrategy, ProviderOperationHooks};
use ptooling::{DefaultToolRuntime, ToolRegistry, ToolRuntimeHooks};

use crate::config::ParleyConfig;
use crate::error::ParleyError;

/// The deployment-specific pieces the orchestrator cannot build itself.
pub struct Collaborators {
    pub strategy: Arc<dyn ConversationStrategy>,
    pub tools: ToolRegistry,
    pub subscriptions: Arc<dyn SubscriptionService>,
    pub transport: Arc<dyn MessagingTransport>,
}

#[derive(Clone)]
pub struct RuntimeBundle {
    pub orchestrator: Arc<ExchangeOrchestrator>,
    pub history: Arc<dyn HistoryStore>,
}

struct HookSet {
    provider: Arc<dyn ProviderOperationHooks>,
    tools: Arc<dyn ToolRuntimeHooks>,
    exchange: Arc<dyn ExchangeHooks>,
}

impl HookSet {
    fn for_config(config: &ParleyConfig) -> Self {
        if config.metrics {
            Self {
                provider: Arc::new(SafeProviderHooks::new(MetricsObservabilityHooks)),
                tools: Arc::new(SafeToolHooks::new(MetricsObservabilityHooks)),
                exchange: Arc::new(SafeExchangeHooks::new(MetricsObservabilityHooks)),
            }
        } else {
            Self {
                provider: Arc::new(SafeProviderHooks::new(TracingObservabilityHooks)),
                tools: Arc::new(SafeToolHooks::new(TracingObservabilityHooks)),
                exchange: Arc::new(SafeExchangeHooks::new(TracingObservabilityHooks)),
            }
        }
    }
}

pub fn build_runtime(
    config: &ParleyConfig,
    collaborators: Collaborators,
) -> Result<RuntimeBundle, ParleyError> {
    let history = create_history_store(config.history.clone())?;
    build_runtime_with_history(config, collaborators, history)
}

/// Like [`build_runtime`] but with a caller-supplied history store, ignoring
/// `config.history`.
pub fn build_runtime_with_history(
    config: &ParleyConfig,
    collaborators: Collaborators,
    history: Arc<dyn HistoryStore>,
) -> Result<RuntimeBundle, ParleyError> {
    config.validate()?;
    let hooks = HookSet::for_config(config);

    let registry = Arc::new(collaborators.tools);
    let runtime =
        DefaultToolRuntime::new(Arc::clone(&registry)).with_hooks(Arc::clone(&hooks.tools));
    let dispatcher = ToolDispatcher::new(registry, collaborators.subscriptions)
        .with_runtime(Arc::new(runtime))
        .with_transport(collaborators.transport)
        .with_hooks(hooks.tools);

    let orchestrator = ExchangeOrchestrator::builder(collaborators.strategy, dispatcher)
        .history_store(Arc::clone(&history))
        .policy(config.exchange_policy())
        .turn_budget(config.turn_budget())
        .lock(ConversationLock::new(config.lock_policy()))
        .hooks(hooks.exchange)
        .provider_hooks(hooks.provider)
        .build()?;

    tracing::info!(
        phase = "runtime",
        model = %config.model,
        tools = orchestrator.tool_schema().len(),
        metrics = config.metrics,
        "exchange orchestrator ready"
    );

    Ok(RuntimeBundle {
        orchestrator: Arc::new(orchestrator),
        history,
    })
}

#[cfg(feature = "provider-openai")]
pub use openai::openai_strategy;

#[cfg(feature = "provider-openai")]
mod openai {
    use std::sync::Arc;
    use std::time::Duration;

    use pprovider::adapters::openai::{OpenAiHttpTransport, OpenAiProvider};
    use pprovider::{ConversationStrategy, ProviderError, StatelessStrategy};
    use reqwest::Client;

    use crate::config::OpenAiConfig;
    use crate::error::ParleyError;

    /// Full-history strategy over the chat-completions API described by
    /// `config`. A custom `base_url` without a key talks to a keyless
    /// compatible endpoint.
    pub fn openai_strategy(
        config: &OpenAiConfig,
    ) -> Result<Arc<dyn ConversationStrategy>, ParleyError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ProviderError::transport(err.to_string()))?;

        let mut transport = OpenAiHttpTransport::new(client).with_timeout(timeout);
        if let Some(base_url) = &config.base_url {
            transport = transport.with_base_url(base_url.clone());
        }
        let transport = Arc::new(transport);

        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty());
        let provider = match (api_key, &config.base_url) {
            (Some(key), _) => OpenAiProvider::new(transport, key),
            (None, Some(_)) => OpenAiProvider::compatible(transport),
            (None, None) => {
                return Err(ProviderError::authentication(
                    "an OpenAI API key is required for the public endpoint",
                )
                .into());
            }
        };

        Ok(Arc::new(StatelessStrategy::new(Arc::new(provider))))
    }

}
