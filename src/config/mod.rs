//! Configuration management for the admission engine
//!
//! This module handles loading, validation, and serialization of the engine configuration.

pub mod models;
pub mod validation;

pub use models::*;
pub use validation::Validate;

use crate::utils::error::{AdmissionError, Result};
use std::path::Path;
use tracing::{debug, info};

/// Main configuration struct
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Admission configuration
    pub admission: AdmissionConfig,
}

impl Config {
    /// Load configuration from file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {:?}", path);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AdmissionError::Config(format!("Failed to read config file: {}", e)))?;

        let config = Self::from_yaml_str(&content)?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Parse and validate YAML configuration
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let admission: AdmissionConfig = serde_yaml::from_str(content)
            .map_err(|e| AdmissionError::Config(format!("Failed to parse config: {}", e)))?;

        let config = Self { admission };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");

        let admission = AdmissionConfig::from_env()?;
        let config = Self { admission };

        config.validate()?;
        Ok(config)
    }

    /// Get rate limit configuration
    pub fn rate_limit(&self) -> &RateLimitConfig {
        &self.admission.rate_limit
    }

    /// Get quota configuration
    pub fn quota(&self) -> &QuotaConfig {
        &self.admission.quota
    }

    /// Get storage configuration
    pub fn storage(&self) -> &StorageConfig {
        &self.admission.storage
    }

    /// Get logging configuration
    pub fn logging(&self) -> &LoggingConfig {
        &self.admission.logging
    }

    /// Get failure policy
    pub fn failure_policy(&self) -> FailurePolicy {
        self.admission.failure_policy
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        debug!("Validating configuration");

        self.admission
            .validate()
            .map_err(|e| AdmissionError::Config(format!("Invalid configuration: {}", e)))?;

        debug!("Configuration validation completed");
        Ok(())
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.admission).map_err(|e| {
            AdmissionError::Config(format!("Failed to serialize config to JSON: {}", e))
        })
    }

    /// Convert to YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self.admission).map_err(|e| {
            AdmissionError::Config(format!("Failed to serialize config to YAML: {}", e))
        })
    }
}

impl From<AdmissionConfig> for Config {
    fn from(admission: AdmissionConfig) -> Self {
        Self { admission }
    }
}
