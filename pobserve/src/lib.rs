//! Observability hooks for provider, tool and exchange phases.
//!
//! ```rust
//! use pobserve::{MetricsObservabilityHooks, SafeExchangeHooks, TracingObservabilityHooks};
//!
//! let _exchange_hooks = SafeExchangeHooks::new(TracingObservabilityHooks);
//! let _metrics = MetricsObservabilityHooks;
//! ```

mod metrics_hooks;
mod safe_hooks;
mod tracing_hooks;

pub use metrics_hooks::MetricsObservabilityHooks;
pub use safe_hooks::{SafeExchangeHooks, SafeProviderHooks, SafeToolHooks};
pub use tracing_hooks::TracingObservabilityHooks;

pub mod prelude {
    pub use crate::{
        MetricsObservabilityHooks, SafeExchangeHooks, SafeProviderHooks, SafeToolHooks,
        TracingObservabilityHooks,
    };
}
