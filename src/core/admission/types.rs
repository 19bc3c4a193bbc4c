//! Admission request and statistics types

use crate::core::scope::{QuotaType, Scope};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// One metered call to admit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionRequest {
    /// Scope the caller is charged under
    pub scope: Scope,
    /// Scope member, e.g. the user id
    pub identifier: String,
    /// Upstream provider the call goes to
    pub provider: String,
    /// Quota metric the estimate is expressed in
    pub quota_type: QuotaType,
    /// Estimated quota cost, reserved until settled
    pub estimated_cost: f64,
    /// Units taken from each rate limiter
    #[serde(default = "default_rate_cost")]
    pub rate_cost: f64,
}

fn default_rate_cost() -> f64 {
    1.0
}

impl AdmissionRequest {
    pub fn new(
        scope: Scope,
        identifier: impl Into<String>,
        provider: impl Into<String>,
        quota_type: QuotaType,
        estimated_cost: f64,
    ) -> Self {
        Self {
            scope,
            identifier: identifier.into(),
            provider: provider.into(),
            quota_type,
            estimated_cost,
            rate_cost: default_rate_cost(),
        }
    }

    /// Shorthand for a user-scoped request
    pub fn user(
        identifier: impl Into<String>,
        provider: impl Into<String>,
        quota_type: QuotaType,
        estimated_cost: f64,
    ) -> Self {
        Self::new(Scope::User, identifier, provider, quota_type, estimated_cost)
    }

    /// Weight the request for rate limiting
    pub fn with_rate_cost(mut self, rate_cost: f64) -> Self {
        self.rate_cost = rate_cost;
        self
    }
}

/// Live admission counters
#[derive(Debug, Default)]
pub struct AtomicAdmissionStats {
    pub admitted: AtomicU64,
    pub rate_limited: AtomicU64,
    pub quota_denied: AtomicU64,
    pub errors: AtomicU64,
    pub store_failures: AtomicU64,
    pub fail_open_admissions: AtomicU64,
    pub settled: AtomicU64,
    pub cancelled: AtomicU64,
    pub abandoned: AtomicU64,
}

impl AtomicAdmissionStats {
    pub(super) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the counters into a snapshot
    pub fn snapshot(&self) -> AdmissionStats {
        AdmissionStats {
            admitted: self.admitted.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            quota_denied: self.quota_denied.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            fail_open_admissions: self.fail_open_admissions.load(Ordering::Relaxed),
            settled: self.settled.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}

/// Admission statistics snapshot (returned to callers)
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct AdmissionStats {
    /// Requests admitted, fail-open admissions included
    pub admitted: u64,
    pub rate_limited: u64,
    pub quota_denied: u64,
    /// Requests refused for invalid input, missing configuration or
    /// exhausted retries
    pub errors: u64,
    /// Admissions, settles and cancels that hit an unreachable store
    pub store_failures: u64,
    pub fail_open_admissions: u64,
    pub settled: u64,
    pub cancelled: u64,
    /// Tickets dropped without settle or cancel
    pub abandoned: u64,
}

impl AdmissionStats {
    /// Share of checked requests that were denied by a limiter or a quota
    pub fn denial_rate(&self) -> f64 {
        let denied = self.rate_limited + self.quota_denied;
        let total = self.admitted + denied;
        if total == 0 {
            0.0
        } else {
            denied as f64 / total as f64
        }
    }
}
