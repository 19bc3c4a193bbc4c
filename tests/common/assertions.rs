//! Custom test assertions

use llm_admission::{AdmissionError, QuotaPeriod, Scope};
use std::fmt::Debug;

/// Assertions on admission outcomes
pub trait DenialAssertions {
    /// Assert a rate-limit denial and return its retry hint
    fn assert_rate_limited(&self) -> u64;

    /// Assert a quota denial on the given scope and period
    fn assert_quota_denied(&self, scope: Scope, period: QuotaPeriod);
}

impl<T: Debug> DenialAssertions for llm_admission::Result<T> {
    fn assert_rate_limited(&self) -> u64 {
        match self {
            Err(AdmissionError::RateLimitExceeded {
                retry_after_secs, ..
            }) => *retry_after_secs,
            other => panic!("Expected RateLimitExceeded, got {:?}", other),
        }
    }

    fn assert_quota_denied(&self, scope: Scope, period: QuotaPeriod) {
        match self {
            Err(AdmissionError::QuotaExceeded {
                scope: denied_scope,
                period: denied_period,
                ..
            }) => {
                assert_eq!(*denied_scope, scope, "denied by the wrong scope");
                assert_eq!(*denied_period, period, "denied by the wrong period");
            }
            other => panic!("Expected QuotaExceeded, got {:?}", other),
        }
    }
}

/// Assert two values are approximately equal (for floats)
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr) => {
        assert_approx_eq!($left, $right, 1e-6_f64)
    };
    ($left:expr, $right:expr, $epsilon:expr) => {
        let left_val: f64 = $left as f64;
        let right_val: f64 = $right as f64;
        let diff = (left_val - right_val).abs();
        assert!(
            diff < $epsilon,
            "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` (epsilon: `{:?}`)",
            left_val,
            right_val,
            diff,
            $epsilon
        );
    };
}
