//! Tracing subscriber setup.

use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber: env-filtered fmt output plus span
/// traces on errors. Honors `RUST_LOG`; defaults to `info` for this crate.
///
/// Idempotent: repeated calls (e.g. from multiple tests) are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,session_relay=info"));

    let fmt_layer = fmt::layer().with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .try_init()
        .ok();
}
