//! Process-wide tracing setup.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber. `RUST_LOG` wins over `level`; debug
/// builds print human-readable lines, release builds emit JSON.
///
/// Returns `false` when a subscriber was already installed.
pub fn init_tracing(level: &str) -> bool {
    let default_filter = format!("{level},parley={level},pchat={level}");
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    #[cfg(debug_assertions)]
    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().pretty().with_target(false))
        .try_init()
        .is_ok();

    #[cfg(not(debug_assertions))]
    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json().with_current_span(true))
        .try_init()
        .is_ok();

    installed
}
