//! Core configuration validators
//!
//! This module provides validation implementations for the top-level
//! admission configuration and logging.

use super::trait_def::Validate;
use crate::config::models::*;
use tracing::debug;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Validate for AdmissionConfig {
    fn validate(&self) -> Result<(), String> {
        debug!("Validating admission configuration");

        self.rate_limit.validate()?;
        self.quota.validate()?;
        self.storage.validate()?;
        self.logging.validate()?;

        debug!("Admission configuration validation completed");
        Ok(())
    }
}

impl Validate for LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        if self.level.is_empty() {
            return Err("Log level cannot be empty".to_string());
        }

        // Plain levels are checked; full filter directives are left to EnvFilter
        if !self.level.contains('=')
            && !self.level.contains(',')
            && !LOG_LEVELS.contains(&self.level.to_ascii_lowercase().as_str())
        {
            return Err(format!(
                "Unsupported log level: {}. Supported levels: {:?}",
                self.level, LOG_LEVELS
            ));
        }

        Ok(())
    }
}
