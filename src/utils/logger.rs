use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LogLevel;

/// Initializes the global `tracing` subscriber. `LOG_LEVEL` seeds the
/// default filter; `RUST_LOG`, if set, still wins (`EnvFilter`'s usual
/// precedence).
pub fn setup_logging(level: LogLevel) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true).with_line_number(true).compact())
        .with(env_filter)
        .init();

    Ok(())
}
