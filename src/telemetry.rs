//! Tracing setup for embedders and tests.
//!
//! The outbox itself only emits `tracing` events; installing a subscriber is
//! the embedder's call. This helper wires the common case: an `EnvFilter`
//! honouring `RUST_LOG` with a fallback level, and a compact fmt layer.
//! Initialisation is idempotent so library tests can call it freely.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter` (e.g. `"info"` or `"mqtt_outbox=debug"`).
///
/// Returns `Ok(())` if a subscriber was already installed.
pub fn init(default_filter: &str) -> Result<(), String> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let fmt_layer = fmt::layer().compact().with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .or_else(|err| {
            if err
                .to_string()
                .contains("a global default trace dispatcher has already been set")
            {
                Ok(())
            } else {
                Err(format!("failed to initialize tracing: {err}"))
            }
        })
}
