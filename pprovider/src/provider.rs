use crate::{ModelRequest, ModelResponse, ProviderError, ProviderId};

pub use pcommon::BoxFuture as ProviderFuture;

/// A single-shot completion backend.
pub trait ModelProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    fn complete<'a>(
        &'a self,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<ModelResponse, ProviderError>>;
}
