//! Key construction and read-only status for the rate limiter

use super::limiter::RateLimiter;
use super::strategies::{from_units, window_start};
use super::types::{RateLimitResult, RateLimitState, SlidingWindowState};
use crate::config::models::rate_limit::{RateLimitRule, RateLimitStrategy};
use crate::core::scope::{GLOBAL_SCOPE_ID, Scope};
use crate::utils::error::Result;

/// `scope:identifier[:provider]`
pub(super) fn limiter_key(
    rule: &RateLimitRule,
    scope: Scope,
    identifier: &str,
    provider: &str,
) -> String {
    let identifier = if scope == Scope::Global {
        GLOBAL_SCOPE_ID
    } else {
        identifier
    };
    if rule.per_provider {
        format!("{}:{}:{}", scope, identifier, provider)
    } else {
        format!("{}:{}", scope, identifier)
    }
}

/// Store key; the rule name keeps several rules on one scope apart
pub(super) fn storage_key(rule: &RateLimitRule, limiter_key: &str) -> String {
    format!("ratelimit:{}:{}", rule.name, limiter_key)
}

impl RateLimiter {
    /// Current state of every rule for a key, without consuming anything
    pub async fn status(
        &self,
        scope: Scope,
        identifier: &str,
        provider: &str,
    ) -> Result<Vec<RateLimitResult>> {
        let now = self.clock.now();
        let mut results = Vec::new();

        for rule in self.rules_for(scope, provider) {
            let key = limiter_key(rule, scope, identifier, provider);
            let storage_key = storage_key(rule, &key);
            let limit = rule.limit_for(identifier);
            let strategy = self.effective_strategy(rule);

            let (usage, retry_after_secs) = match strategy {
                RateLimitStrategy::TokenBucket => {
                    let rate = limit / rule.window_secs as f64;
                    let mut bucket = self
                        .updater
                        .load::<RateLimitState>(&storage_key)
                        .await?
                        .unwrap_or_else(|| RateLimitState::full(limit, rate, now));
                    bucket.reconfigure(limit, rate);
                    bucket.refill(now);
                    let retry = (bucket.tokens_available < 1.0_f64.min(limit))
                        .then(|| bucket.retry_after(1.0_f64.min(limit)));
                    (limit - bucket.tokens_available, retry)
                }
                RateLimitStrategy::SlidingWindow => {
                    let window = rule.window_secs as f64;
                    let mut log = self
                        .updater
                        .load::<SlidingWindowState>(&storage_key)
                        .await?
                        .unwrap_or_default();
                    log.prune(now, window);
                    let usage = log.usage();
                    let retry = (usage >= limit).then(|| log.retry_after(now, window, limit, 0.0));
                    (usage, retry)
                }
                RateLimitStrategy::FixedWindow => {
                    let start = window_start(now, rule.window_secs);
                    let counter = self
                        .updater
                        .store()
                        .get(&format!("{}:{}", storage_key, start))
                        .await?
                        .and_then(|raw| raw.parse::<i64>().ok())
                        .unwrap_or(0);
                    let usage = from_units(counter);
                    let reset_in = (start + rule.window_secs.max(1)) as f64 - now;
                    let retry = (usage >= limit).then(|| reset_in.ceil().max(1.0) as u64);
                    (usage, retry)
                }
            };

            results.push(RateLimitResult {
                key,
                rule: rule.name.clone(),
                strategy,
                allowed: usage < limit,
                current_usage: usage,
                limit,
                remaining: (limit - usage).max(0.0),
                retry_after_secs,
            });
        }

        Ok(results)
    }
}
