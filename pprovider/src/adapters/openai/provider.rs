//! OpenAI provider implementation over transport and shared models.

use std::sync::Arc;

use crate::{ModelProvider, ModelRequest, ModelResponse, ProviderError, ProviderFuture, ProviderId};

use super::transport::OpenAiTransport;
use super::types::{OpenAiAuth, OpenAiMessage, OpenAiRequest, OpenAiTool};

#[derive(Clone)]
pub struct OpenAiProvider {
    transport: Arc<dyn OpenAiTransport>,
    auth: OpenAiAuth,
    id: ProviderId,
    fallback_model: String,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("transport", &self.transport)
            .field("auth", &self.auth)
            .field("id", &self.id)
            .field("fallback_model", &self.fallback_model)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(transport: Arc<dyn OpenAiTransport>, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            auth: OpenAiAuth::ApiKey(api_key.into()),
            id: ProviderId::OpenAi,
            fallback_model: "gpt-4o-mini".to_string(),
        }
    }

    /// For self-hosted endpoints that take no key.
    pub fn compatible(transport: Arc<dyn OpenAiTransport>) -> Self {
        Self {
            transport,
            auth: OpenAiAuth::None,
            id: ProviderId::OpenAiCompatible,
            fallback_model: "gpt-4o-mini".to_string(),
        }
    }

    pub fn with_fallback_model(mut self, model: impl Into<String>) -> Self {
        self.fallback_model = model.into();
        self
    }

    pub(crate) fn build_openai_request(&self, request: ModelRequest) -> OpenAiRequest {
        let model = if request.model.trim().is_empty() {
            self.fallback_model.clone()
        } else {
            request.model
        };

        let messages = request
            .system
            .filter(|system| !system.trim().is_empty())
            .map(OpenAiMessage::system)
            .into_iter()
            .chain(request.messages.into_iter().map(OpenAiMessage::from))
            .collect();

        OpenAiRequest {
            model,
            messages,
            tools: request.tools.into_iter().map(OpenAiTool::from).collect(),
            temperature: request.options.temperature,
            max_tokens: request.options.max_tokens,
        }
    }
}

impl ModelProvider for OpenAiProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn complete<'a>(
        &'a self,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<ModelResponse, ProviderError>> {
        Box::pin(async move {
            request.validate()?;
            let openai_request = self.build_openai_request(request);
            let response = self
                .transport
                .complete(openai_request, self.auth.clone())
                .await?;
            response.into_model_response(self.id)
        })
    }
}
