//! Error types for the admission engine

use crate::core::scope::{QuotaPeriod, QuotaType, Scope};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias for the admission engine
pub type Result<T> = std::result::Result<T, AdmissionError>;

/// Main error type for the admission engine
#[derive(Error, Debug)]
pub enum AdmissionError {
    /// A rate limiter denied the request
    #[error(
        "Rate limit exceeded for {key}: usage {current_usage} of {limit}, retry after {retry_after_secs}s"
    )]
    RateLimitExceeded {
        key: String,
        current_usage: f64,
        limit: f64,
        retry_after_secs: u64,
    },

    /// A quota in the scope chain has no headroom left
    #[error(
        "Quota exceeded for {scope}:{scope_id} ({quota_type}/{period}): used {used} + reserved {reserved} of {limit}, resets at {reset_at}"
    )]
    QuotaExceeded {
        scope: Scope,
        scope_id: String,
        quota_type: QuotaType,
        period: QuotaPeriod,
        used: f64,
        reserved: f64,
        limit: f64,
        reset_at: DateTime<Utc>,
    },

    /// Configuration errors, including missing limits for a scope
    #[error("Configuration error: {0}")]
    Config(String),

    /// The backing state store cannot be reached
    #[error("State store unavailable: {0}")]
    StateStoreUnavailable(String),

    /// Redis errors
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid arguments, such as a negative cost
    #[error("Validation error: {0}")]
    Validation(String),

    /// Optimistic update lost too many races
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AdmissionError {
    /// Whether this is a normal admission denial rather than a failure
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            AdmissionError::RateLimitExceeded { .. } | AdmissionError::QuotaExceeded { .. }
        )
    }

    /// Whether retrying later can succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            AdmissionError::RateLimitExceeded { .. }
            | AdmissionError::QuotaExceeded { .. }
            | AdmissionError::Conflict(_) => true,
            _ => self.is_state_store_unavailable(),
        }
    }

    /// Whether the failure came from the backing store
    pub fn is_state_store_unavailable(&self) -> bool {
        match self {
            AdmissionError::StateStoreUnavailable(_) => true,
            #[cfg(feature = "redis")]
            AdmissionError::Redis(_) => true,
            _ => false,
        }
    }

    /// Backoff hint for rate-limit denials
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            AdmissionError::RateLimitExceeded {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Period rollover time for quota denials
    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        match self {
            AdmissionError::QuotaExceeded { reset_at, .. } => Some(*reset_at),
            _ => None,
        }
    }
}
