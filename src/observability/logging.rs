//! Structured logging setup.
//!
//! JSON output for production (easy to ship to a log aggregator), pretty
//! output for local development; both go through the same `tracing`
//! subscriber so every module's `tracing::info!`/`warn!`/`error!` calls
//! need no further wiring.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize the global tracing subscriber. `log_level` is the config's
/// `observability.logLevel`; `RUST_LOG`, if set, takes precedence.
pub fn init(log_level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level.to_string()));

    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
