//! Tracing/logging initialization

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Initialize the tracing subscriber based on configuration.
///
/// Thread names are included so pool traffic is attributable to capture
/// threads versus the frame-split worker.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match config.format.as_str() {
        "json" => {
            let fmt_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_thread_names(true)
                .with_thread_ids(true);
            subscriber.with(fmt_layer).init();
        }
        _ => {
            let fmt_layer = fmt::layer().with_target(true).with_thread_names(true);
            subscriber.with(fmt_layer).init();
        }
    }

    Ok(())
}
