//! Structured denial details for callers
//!
//! Callers that front the engine with HTTP turn a denial into a 429 body and a
//! `Retry-After` header from this.

use super::types::AdmissionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Machine-readable description of an admission error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenialDetail {
    /// Stable error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Whether retrying later can succeed
    pub retryable: bool,
    /// Seconds to wait before retrying (rate limits)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    /// When the exhausted quota rolls over
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
}

impl AdmissionError {
    /// Stable code used in denial bodies and logs
    pub fn code(&self) -> &'static str {
        match self {
            AdmissionError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            AdmissionError::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            AdmissionError::Config(_) => "CONFIG_ERROR",
            AdmissionError::StateStoreUnavailable(_) => "STATE_STORE_UNAVAILABLE",
            #[cfg(feature = "redis")]
            AdmissionError::Redis(_) => "STATE_STORE_UNAVAILABLE",
            AdmissionError::Serialization(_) => "SERIALIZATION_ERROR",
            AdmissionError::Yaml(_) => "CONFIG_ERROR",
            AdmissionError::Io(_) => "IO_ERROR",
            AdmissionError::Validation(_) => "VALIDATION_ERROR",
            AdmissionError::Conflict(_) => "CONFLICT",
            AdmissionError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Build the structured detail for this error
    pub fn denial_detail(&self) -> DenialDetail {
        let message = match self {
            // Store internals stay out of caller-facing messages
            AdmissionError::StateStoreUnavailable(_) => {
                "Admission state store unavailable".to_string()
            }
            #[cfg(feature = "redis")]
            AdmissionError::Redis(_) => "Admission state store unavailable".to_string(),
            _ => self.to_string(),
        };

        DenialDetail {
            code: self.code().to_string(),
            message,
            retryable: self.is_retryable(),
            retry_after_secs: self.retry_after_secs(),
            reset_at: self.reset_at(),
        }
    }
}
