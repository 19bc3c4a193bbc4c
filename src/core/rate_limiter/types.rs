//! Rate limiter types and data structures

use crate::config::models::rate_limit::RateLimitStrategy;
use crate::utils::error::AdmissionError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Outcome of checking one rule against one key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitResult {
    /// Limiter key, `scope:identifier[:provider]`
    pub key: String,
    /// Rule that produced this result
    pub rule: String,
    /// Strategy actually used, after any fixed-window fallback
    pub strategy: RateLimitStrategy,
    /// Whether the request is allowed
    pub allowed: bool,
    /// Cost units in use, before this request when denied
    pub current_usage: f64,
    /// Capacity or window limit
    pub limit: f64,
    /// Units still available
    pub remaining: f64,
    /// Retry after (in seconds, only set when not allowed)
    pub retry_after_secs: Option<u64>,
}

impl RateLimitResult {
    /// The denial error for this result
    pub fn to_error(&self) -> AdmissionError {
        AdmissionError::RateLimitExceeded {
            key: self.key.clone(),
            current_usage: self.current_usage,
            limit: self.limit,
            retry_after_secs: self.retry_after_secs.unwrap_or(1),
        }
    }
}

/// Token bucket state, one per limiter key.
///
/// `0 <= tokens_available <= tokens_capacity` holds after every operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitState {
    pub tokens_available: f64,
    pub tokens_capacity: f64,
    pub last_refill_time: f64,
    pub refill_rate_per_second: f64,
}

impl RateLimitState {
    /// A bucket at full capacity
    pub fn full(capacity: f64, rate: f64, now: f64) -> Self {
        Self {
            tokens_available: capacity,
            tokens_capacity: capacity,
            last_refill_time: now,
            refill_rate_per_second: rate,
        }
    }

    /// Apply the current rule parameters, clamping to a reduced capacity
    pub fn reconfigure(&mut self, capacity: f64, rate: f64) {
        self.tokens_capacity = capacity;
        self.refill_rate_per_second = rate;
        self.tokens_available = self.tokens_available.clamp(0.0, capacity);
    }

    /// Add tokens for the time elapsed since the last refill.
    ///
    /// A clock that steps backwards adds nothing and leaves `last_refill_time`
    /// where it was, so tokens never decrease here.
    pub fn refill(&mut self, now: f64) {
        let elapsed = (now - self.last_refill_time).max(0.0);
        self.tokens_available = (self.tokens_available + elapsed * self.refill_rate_per_second)
            .min(self.tokens_capacity);
        self.last_refill_time = self.last_refill_time.max(now);
    }

    /// Seconds until `cost` tokens are available
    pub fn retry_after(&self, cost: f64) -> u64 {
        let deficit = (cost - self.tokens_available).max(0.0);
        if self.refill_rate_per_second <= 0.0 {
            return u64::MAX;
        }
        // Absorb float noise so an exact one-second wait reports 1, not 2
        let secs = (deficit / self.refill_rate_per_second - 1e-9).ceil();
        (secs.max(1.0)) as u64
    }
}

/// One admission inside a sliding window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowEntry {
    pub at: f64,
    pub weight: f64,
}

/// Admissions inside the trailing window, oldest first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlidingWindowState {
    pub entries: VecDeque<WindowEntry>,
}

impl SlidingWindowState {
    /// Drop entries at or before `now - window`
    pub fn prune(&mut self, now: f64, window: f64) {
        let cutoff = now - window;
        while self.entries.front().is_some_and(|e| e.at <= cutoff) {
            self.entries.pop_front();
        }
    }

    /// Total weight admitted in the window
    pub fn usage(&self) -> f64 {
        self.entries.iter().map(|e| e.weight).sum()
    }

    /// Record an admission, keeping entries ordered by time
    pub fn push(&mut self, entry: WindowEntry) {
        let index = self.entries.partition_point(|e| e.at <= entry.at);
        self.entries.insert(index, entry);
    }

    /// Seconds until enough weight leaves the window to admit `cost`
    pub fn retry_after(&self, now: f64, window: f64, limit: f64, cost: f64) -> u64 {
        let mut usage = self.usage();
        for entry in &self.entries {
            usage -= entry.weight;
            if usage + cost <= limit {
                let wait = window - (now - entry.at) + 1.0;
                return wait.floor().max(1.0) as u64;
            }
        }
        (window.floor() as u64).max(1)
    }

    /// Remove one previously recorded admission
    pub fn remove(&mut self, at: f64, weight: f64) -> bool {
        match self
            .entries
            .iter()
            .position(|e| e.at == at && e.weight == weight)
        {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }
}

/// Consumption taken by a successful check, kept so it can be refunded
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitGrant {
    pub(super) rule: String,
    pub(super) storage_key: String,
    pub(super) ttl: u64,
    pub(super) kind: GrantKind,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum GrantKind {
    TokenBucket { cost: f64 },
    SlidingWindow { at: f64, cost: f64 },
    FixedWindow { units: i64 },
}

impl RateLimitGrant {
    /// Rule the grant was taken under
    pub fn rule(&self) -> &str {
        &self.rule
    }
}

/// Grants taken by one successful [`check_limit`](super::RateLimiter::check_limit)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitDecision {
    pub grants: Vec<RateLimitGrant>,
    /// Per-rule results, in evaluation order
    pub results: Vec<RateLimitResult>,
}

impl RateLimitDecision {
    /// Tightest remaining headroom across the rules checked
    pub fn remaining(&self) -> Option<f64> {
        self.results
            .iter()
            .map(|r| r.remaining)
            .min_by(|a, b| a.total_cmp(b))
    }

    pub fn merge(&mut self, other: RateLimitDecision) {
        self.grants.extend(other.grants);
        self.results.extend(other.results);
    }
}
