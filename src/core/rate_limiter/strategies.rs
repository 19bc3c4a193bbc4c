//! Rate limiting strategy implementations

use super::limiter::RateLimiter;
use super::types::{
    GrantKind, RateLimitGrant, RateLimitResult, RateLimitState, SlidingWindowState, WindowEntry,
};
use crate::config::models::rate_limit::{RateLimitRule, RateLimitStrategy};
use crate::storage::Update;
use crate::utils::error::{AdmissionError, Result};

/// Fixed-window counters hold integer units; costs are metered in thousandths
pub(super) const FIXED_WINDOW_SCALE: f64 = 1000.0;

pub(super) fn to_units(cost: f64) -> i64 {
    (cost * FIXED_WINDOW_SCALE).round() as i64
}

pub(super) fn from_units(units: i64) -> f64 {
    units as f64 / FIXED_WINDOW_SCALE
}

/// Start of the fixed window containing `now`
pub(super) fn window_start(now: f64, window_secs: u64) -> u64 {
    let window = window_secs.max(1);
    (now.max(0.0) as u64 / window) * window
}

pub(super) fn state_ttl(rule: &RateLimitRule) -> u64 {
    // A bucket idle this long is full again, so expiry loses nothing
    rule.window_secs + 1
}

fn too_large(rule: &RateLimitRule, key: &str, cost: f64, limit: f64) -> AdmissionError {
    AdmissionError::validation(format!(
        "cost {} exceeds the limit {} of rule '{}' on {} and can never be admitted",
        cost, limit, rule.name, key
    ))
}

impl RateLimiter {
    /// Token bucket: refill, then take `cost` tokens if available
    pub(super) async fn check_token_bucket(
        &self,
        rule: &RateLimitRule,
        key: String,
        storage_key: String,
        capacity: f64,
        cost: f64,
        now: f64,
    ) -> Result<(RateLimitResult, Option<RateLimitGrant>)> {
        if cost > capacity {
            return Err(too_large(rule, &key, cost, capacity));
        }
        let rate = capacity / rule.window_secs as f64;
        let ttl = state_ttl(rule);

        let result = self
            .updater
            .update(&storage_key, Some(ttl), |state: Option<RateLimitState>| {
                let mut bucket = state.unwrap_or_else(|| RateLimitState::full(capacity, rate, now));
                bucket.reconfigure(capacity, rate);
                bucket.refill(now);

                if bucket.tokens_available >= cost {
                    bucket.tokens_available -= cost;
                    let result = RateLimitResult {
                        key: key.clone(),
                        rule: rule.name.clone(),
                        strategy: RateLimitStrategy::TokenBucket,
                        allowed: true,
                        current_usage: capacity - bucket.tokens_available,
                        limit: capacity,
                        remaining: bucket.tokens_available,
                        retry_after_secs: None,
                    };
                    Ok(Update::Write(bucket, result))
                } else {
                    Ok(Update::Keep(RateLimitResult {
                        key: key.clone(),
                        rule: rule.name.clone(),
                        strategy: RateLimitStrategy::TokenBucket,
                        allowed: false,
                        current_usage: capacity - bucket.tokens_available,
                        limit: capacity,
                        remaining: bucket.tokens_available,
                        retry_after_secs: Some(bucket.retry_after(cost)),
                    }))
                }
            })
            .await?;

        let grant = result.allowed.then(|| RateLimitGrant {
            rule: rule.name.clone(),
            storage_key,
            ttl,
            kind: GrantKind::TokenBucket { cost },
        });
        Ok((result, grant))
    }

    /// Sliding window: prune, then admit if the window has room for `cost`
    pub(super) async fn check_sliding_window(
        &self,
        rule: &RateLimitRule,
        key: String,
        storage_key: String,
        limit: f64,
        cost: f64,
        now: f64,
    ) -> Result<(RateLimitResult, Option<RateLimitGrant>)> {
        if cost > limit {
            return Err(too_large(rule, &key, cost, limit));
        }
        let window = rule.window_secs as f64;
        let ttl = state_ttl(rule);

        let result = self
            .updater
            .update(&storage_key, Some(ttl), |state: Option<SlidingWindowState>| {
                let mut log = state.unwrap_or_default();
                log.prune(now, window);
                let usage = log.usage();

                if usage + cost > limit {
                    return Ok(Update::Keep(RateLimitResult {
                        key: key.clone(),
                        rule: rule.name.clone(),
                        strategy: RateLimitStrategy::SlidingWindow,
                        allowed: false,
                        current_usage: usage,
                        limit,
                        remaining: (limit - usage).max(0.0),
                        retry_after_secs: Some(log.retry_after(now, window, limit, cost)),
                    }));
                }

                if cost > 0.0 {
                    log.push(WindowEntry { at: now, weight: cost });
                }
                let result = RateLimitResult {
                    key: key.clone(),
                    rule: rule.name.clone(),
                    strategy: RateLimitStrategy::SlidingWindow,
                    allowed: true,
                    current_usage: usage + cost,
                    limit,
                    remaining: (limit - usage - cost).max(0.0),
                    retry_after_secs: None,
                };
                Ok(Update::Write(log, result))
            })
            .await?;

        let grant = result.allowed.then(|| RateLimitGrant {
            rule: rule.name.clone(),
            storage_key,
            ttl,
            kind: GrantKind::SlidingWindow { at: now, cost },
        });
        Ok((result, grant))
    }

    /// Fixed window on the store's atomic counter.
    ///
    /// The counter is incremented first and rolled back when it overshoots,
    /// so two racers on the last unit can never both be admitted.
    pub(super) async fn check_fixed_window(
        &self,
        rule: &RateLimitRule,
        key: String,
        storage_key: String,
        limit: f64,
        cost: f64,
        now: f64,
    ) -> Result<(RateLimitResult, Option<RateLimitGrant>)> {
        if cost > limit {
            return Err(too_large(rule, &key, cost, limit));
        }
        let start = window_start(now, rule.window_secs);
        let counter_key = format!("{}:{}", storage_key, start);
        let ttl = state_ttl(rule);
        let units = to_units(cost);
        let limit_units = to_units(limit);

        let store = self.updater.store();
        let after = store.increment(&counter_key, units, Some(ttl)).await?;

        if after > limit_units {
            store.increment(&counter_key, -units, Some(ttl)).await?;
            let usage = from_units(after - units);
            let reset_in = (start + rule.window_secs.max(1)) as f64 - now;
            let result = RateLimitResult {
                key,
                rule: rule.name.clone(),
                strategy: RateLimitStrategy::FixedWindow,
                allowed: false,
                current_usage: usage,
                limit,
                remaining: (limit - usage).max(0.0),
                retry_after_secs: Some(reset_in.ceil().max(1.0) as u64),
            };
            return Ok((result, None));
        }

        let usage = from_units(after);
        let result = RateLimitResult {
            key,
            rule: rule.name.clone(),
            strategy: RateLimitStrategy::FixedWindow,
            allowed: true,
            current_usage: usage,
            limit,
            remaining: (limit - usage).max(0.0),
            retry_after_secs: None,
        };
        let grant = RateLimitGrant {
            rule: rule.name.clone(),
            storage_key: counter_key,
            ttl,
            kind: GrantKind::FixedWindow { units },
        };
        Ok((result, Some(grant)))
    }

    /// Undo one grant
    pub(super) async fn refund_grant(&self, grant: &RateLimitGrant) -> Result<()> {
        let now = self.clock.now();
        match grant.kind {
            GrantKind::TokenBucket { cost } => {
                self.updater
                    .update(
                        &grant.storage_key,
                        Some(grant.ttl),
                        |state: Option<RateLimitState>| match state {
                            // An evicted bucket is rebuilt full; nothing to give back
                            None => Ok(Update::Keep(())),
                            Some(mut bucket) => {
                                bucket.refill(now);
                                bucket.tokens_available =
                                    (bucket.tokens_available + cost).min(bucket.tokens_capacity);
                                Ok(Update::Write(bucket, ()))
                            }
                        },
                    )
                    .await
            }
            GrantKind::SlidingWindow { at, cost } => {
                self.updater
                    .update(
                        &grant.storage_key,
                        Some(grant.ttl),
                        |state: Option<SlidingWindowState>| match state {
                            Some(mut log) => {
                                if log.remove(at, cost) {
                                    Ok(Update::Write(log, ()))
                                } else {
                                    Ok(Update::Keep(()))
                                }
                            }
                            None => Ok(Update::Keep(())),
                        },
                    )
                    .await
            }
            GrantKind::FixedWindow { units } => {
                self.updater
                    .store()
                    .increment(&grant.storage_key, -units, Some(grant.ttl))
                    .await?;
                Ok(())
            }
        }
    }
}
