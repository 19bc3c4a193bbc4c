//! Top-level admission engine configuration

use super::*;
use crate::utils::error::{AdmissionError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Admission engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdmissionConfig {
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// What to do when the state store cannot be reached
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl AdmissionConfig {
    /// Defaults overridden by `LLM_ADMISSION_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(backend) = std::env::var("LLM_ADMISSION_STORAGE_BACKEND") {
            config.storage.backend = backend.parse().map_err(AdmissionError::Config)?;
        }
        if let Ok(url) = std::env::var("LLM_ADMISSION_REDIS_URL") {
            config.storage.redis.url = url;
        }
        if let Ok(prefix) = std::env::var("LLM_ADMISSION_KEY_PREFIX") {
            config.storage.redis.key_prefix = prefix;
        }
        if let Ok(policy) = std::env::var("LLM_ADMISSION_FAILURE_POLICY") {
            config.failure_policy = policy.parse().map_err(AdmissionError::Config)?;
        }
        if let Ok(level) = std::env::var("LLM_ADMISSION_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(json) = std::env::var("LLM_ADMISSION_LOG_JSON") {
            config.logging.json = matches!(json.as_str(), "1" | "true" | "yes");
        }

        Ok(config)
    }
}

/// Behaviour when the state store fails
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Deny the request
    #[default]
    FailClosed,
    /// Admit without metering and log an error
    FailOpen,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "fail_closed" | "closed" => Ok(FailurePolicy::FailClosed),
            "fail_open" | "open" => Ok(FailurePolicy::FailOpen),
            other => Err(format!("unknown failure policy '{}'", other)),
        }
    }
}
