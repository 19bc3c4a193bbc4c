//! Quota types and data structures

use super::period::period_bounds_secs;
use crate::core::clock::seconds_to_utc;
use crate::core::scope::{QuotaPeriod, QuotaType, Scope};
use crate::utils::error::{AdmissionError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one quota: scope × scope_id × quota_type × period
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuotaKey {
    pub scope: Scope,
    pub scope_id: String,
    pub quota_type: QuotaType,
    pub period: QuotaPeriod,
}

impl QuotaKey {
    pub fn new(
        scope: Scope,
        scope_id: impl Into<String>,
        quota_type: QuotaType,
        period: QuotaPeriod,
    ) -> Self {
        Self {
            scope,
            scope_id: scope_id.into(),
            quota_type,
            period,
        }
    }

    /// Key of the quota state in the store
    pub fn storage_key(&self) -> String {
        format!("quota:{}", self)
    }
}

impl fmt::Display for QuotaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.scope, self.scope_id, self.quota_type, self.period
        )
    }
}

/// Relative slack when comparing accumulated amounts with a limit, so
/// decimal costs such as `0.1` add up to their limit exactly
const AMOUNT_EPSILON: f64 = 1e-9;

fn slack(limit: f64) -> f64 {
    AMOUNT_EPSILON * limit.abs().max(1.0)
}

/// Persisted state of one quota
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaState {
    pub limit: f64,
    pub used: f64,
    pub reserved: f64,
    pub period_start: f64,
    pub period_end: f64,
    /// Percent of the limit
    pub warn_threshold: f64,
    /// Percent of the limit
    pub alert_threshold: f64,
    pub last_warning_sent: Option<f64>,
    pub is_exceeded: bool,
}

impl QuotaState {
    /// Fresh state for the period containing `now`
    pub fn new(
        period: QuotaPeriod,
        limit: f64,
        warn_threshold: f64,
        alert_threshold: f64,
        now: f64,
    ) -> Result<Self> {
        let (period_start, period_end) = period_bounds_secs(period, now)?;
        Ok(Self {
            limit,
            used: 0.0,
            reserved: 0.0,
            period_start,
            period_end,
            warn_threshold,
            alert_threshold,
            last_warning_sent: None,
            is_exceeded: false,
        })
    }

    /// Apply current configuration; limits may change between checks
    pub fn refresh(&mut self, limit: f64, warn_threshold: f64, alert_threshold: f64) {
        self.limit = limit;
        self.warn_threshold = warn_threshold;
        self.alert_threshold = alert_threshold;
        self.is_exceeded = self.exhausted();
    }

    /// Start a new period if the current one has ended.
    ///
    /// The new bounds come from `now`, so any number of skipped periods
    /// collapse into one rollover. Returns whether a rollover happened.
    pub fn roll_over(&mut self, period: QuotaPeriod, now: f64) -> Result<bool> {
        if now < self.period_end {
            return Ok(false);
        }
        let (period_start, period_end) = period_bounds_secs(period, now)?;
        self.period_start = period_start;
        self.period_end = period_end;
        self.used = 0.0;
        self.reserved = 0.0;
        self.last_warning_sent = None;
        self.is_exceeded = false;
        Ok(true)
    }

    /// Whether `cost` fits: `used + reserved + cost <= limit`, up to
    /// floating-point rounding
    pub fn admits(&self, cost: f64) -> bool {
        self.used + self.reserved + cost <= self.limit + slack(self.limit)
    }

    /// Whether usage has reached the limit
    pub fn exhausted(&self) -> bool {
        self.used + slack(self.limit) >= self.limit
    }

    /// Drop up to `cost` of the reservation; rounding residue is cleared
    pub fn release(&mut self, cost: f64) {
        let reserved = self.reserved - cost;
        self.reserved = if reserved <= slack(self.limit) {
            0.0
        } else {
            reserved
        };
    }

    /// Book `actual_cost` against a reservation of `reserved_cost`
    pub fn consume(&mut self, actual_cost: f64, reserved_cost: f64) {
        self.release(reserved_cost);
        self.used += actual_cost;
        self.is_exceeded = self.exhausted();
    }

    pub fn remaining(&self) -> f64 {
        (self.limit - self.used - self.reserved).max(0.0)
    }

    /// Consumption as a percentage of the limit
    pub fn usage_percent(&self) -> f64 {
        if self.limit > 0.0 {
            self.used / self.limit * 100.0
        } else if self.used > 0.0 {
            100.0
        } else {
            0.0
        }
    }

    /// Whether the one-time warning of this period is still unsent
    pub fn warning_pending(&self) -> bool {
        self.last_warning_sent
            .is_none_or(|sent| sent < self.period_start)
    }

    pub fn snapshot(&self, key: &QuotaKey) -> QuotaSnapshot {
        QuotaSnapshot {
            scope: key.scope,
            scope_id: key.scope_id.clone(),
            quota_type: key.quota_type,
            period: key.period,
            limit: self.limit,
            used: self.used,
            reserved: self.reserved,
            remaining: self.remaining(),
            usage_percent: self.usage_percent(),
            period_start: seconds_to_utc(self.period_start),
            period_end: seconds_to_utc(self.period_end),
            is_exceeded: self.is_exceeded,
        }
    }

    /// Denial for a check of `key` that did not fit
    pub fn exceeded_error(&self, key: &QuotaKey) -> AdmissionError {
        AdmissionError::QuotaExceeded {
            scope: key.scope,
            scope_id: key.scope_id.clone(),
            quota_type: key.quota_type,
            period: key.period,
            used: self.used,
            reserved: self.reserved,
            limit: self.limit,
            reset_at: seconds_to_utc(self.period_end),
        }
    }
}

/// Read-only view of one quota
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaSnapshot {
    pub scope: Scope,
    pub scope_id: String,
    pub quota_type: QuotaType,
    pub period: QuotaPeriod,
    pub limit: f64,
    pub used: f64,
    pub reserved: f64,
    pub remaining: f64,
    pub usage_percent: f64,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub is_exceeded: bool,
}

impl QuotaSnapshot {
    /// Identity of the quota this snapshot was taken from
    pub fn key(&self) -> QuotaKey {
        QuotaKey::new(self.scope, self.scope_id.clone(), self.quota_type, self.period)
    }
}

/// Outcome of booking or releasing across the quotas of a chain.
///
/// Quotas are updated one by one; a failure on one does not stop the
/// others, and the failed ones keep their reservation.
#[derive(Debug, Default)]
pub struct QuotaBooking {
    /// States after booking, direct scope first; empty for releases
    pub snapshots: Vec<QuotaSnapshot>,
    /// Quotas whose update failed
    pub failed: Vec<QuotaKey>,
    /// First failure
    pub error: Option<AdmissionError>,
}

impl QuotaBooking {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<Vec<QuotaSnapshot>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.snapshots),
        }
    }
}

/// Quotas that passed a [`check_quota`](super::QuotaManager::check_quota)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuotaCheck {
    /// Whether `cost` was reserved on every quota in the chain
    pub reserved: bool,
    pub cost: f64,
    /// State after the check, direct scope first
    pub quotas: Vec<QuotaSnapshot>,
}

impl QuotaCheck {
    /// The quota with the least remaining headroom
    pub fn tightest(&self) -> Option<&QuotaSnapshot> {
        self.quotas
            .iter()
            .min_by(|a, b| a.remaining.total_cmp(&b.remaining))
    }
}
