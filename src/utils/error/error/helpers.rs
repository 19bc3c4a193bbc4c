//! Helper functions for creating specific error types

use super::types::AdmissionError;

impl AdmissionError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    pub fn store_unavailable<S: Into<String>>(message: S) -> Self {
        Self::StateStoreUnavailable(message.into())
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::Conflict(message.into())
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }
}

/// Reject costs that cannot be metered
pub(crate) fn validate_cost(cost: f64, what: &str) -> Result<(), AdmissionError> {
    if !cost.is_finite() || cost < 0.0 {
        return Err(AdmissionError::validation(format!(
            "{} must be a finite, non-negative number, got {}",
            what, cost
        )));
    }
    Ok(())
}
