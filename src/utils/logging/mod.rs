//! Logging setup
//!
//! The engine itself only emits `tracing` events; binaries and embedding
//! services install a subscriber with [`init_logging`].

use crate::config::LoggingConfig;
use crate::utils::error::{AdmissionError, Result};
use tracing_subscriber::EnvFilter;

/// Build the filter: `RUST_LOG` wins over the configured level
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            AdmissionError::config(format!("invalid log filter '{}': {}", config.level, e))
        }),
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = env_filter(config)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| AdmissionError::internal(format!("failed to install logger: {}", e)))
}
