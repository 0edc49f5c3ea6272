//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins over `[logging].level`. Events go to stderr so the
//! batch report on stdout stays clean.

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

pub fn init(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("Invalid logging.level: '{}'", config.level))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if config.is_json() {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    installed.context("Failed to initialize logging")?;

    tracing::debug!(level = %config.level, format = %config.format, "logging initialized");
    Ok(())
}
