//! Core rate limiter implementation

use super::types::{RateLimitDecision, RateLimitGrant, RateLimitResult};
use super::utils::{limiter_key, storage_key};
use crate::config::models::rate_limit::{RateLimitConfig, RateLimitRule, RateLimitStrategy};
use crate::core::clock::Clock;
use crate::core::scope::Scope;
use crate::storage::{AtomicUpdater, DEFAULT_CAS_MAX_RETRIES, StateStore};
use crate::utils::error::{Result, validate_cost};
use std::sync::Arc;
use tracing::{debug, warn};

/// Rate limiter over a shared [`StateStore`]
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Rate limit configuration
    pub(super) config: Arc<RateLimitConfig>,
    /// Optimistic updates against the store
    pub(super) updater: Arc<AtomicUpdater>,
    /// Time source
    pub(super) clock: Arc<dyn Clock>,
    /// The store cannot compare-and-swap, so every rule runs as a fixed window
    pub(super) fixed_window_only: bool,
}

impl RateLimiter {
    /// Create a new rate limiter sharing `updater` with other components
    pub fn new(
        config: RateLimitConfig,
        updater: Arc<AtomicUpdater>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let fixed_window_only = !updater.store().supports_compare_and_swap();
        if fixed_window_only
            && config
                .rules
                .iter()
                .any(|r| r.strategy != RateLimitStrategy::FixedWindow)
        {
            warn!(
                "State store '{}' cannot compare-and-swap; all rate limit rules fall back to fixed windows",
                updater.store().name()
            );
        }

        Self {
            config: Arc::new(config),
            updater,
            clock,
            fixed_window_only,
        }
    }

    /// Create a rate limiter with its own updater over `store`
    pub fn from_store(
        config: RateLimitConfig,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let updater = Arc::new(AtomicUpdater::new(store, DEFAULT_CAS_MAX_RETRIES));
        Self::new(config, updater, clock)
    }

    /// Check if rate limiting is enabled
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Rate limit configuration
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Strategy a rule actually runs with
    pub fn effective_strategy(&self, rule: &RateLimitRule) -> RateLimitStrategy {
        if self.fixed_window_only {
            RateLimitStrategy::FixedWindow
        } else {
            rule.strategy
        }
    }

    /// Rules that govern `scope` for requests to `provider`
    pub(super) fn rules_for<'a>(
        &'a self,
        scope: Scope,
        provider: &'a str,
    ) -> impl Iterator<Item = &'a RateLimitRule> + 'a {
        self.config
            .rules
            .iter()
            .filter(move |r| r.scope == scope && r.applies_to_provider(provider))
    }

    /// Admit `cost` units against every rule of `scope`.
    ///
    /// Rules run in configuration order and the first denial wins; grants
    /// already taken by earlier rules of this call are refunded before the
    /// `RateLimitExceeded` error is returned.
    pub async fn check_limit(
        &self,
        scope: Scope,
        identifier: &str,
        provider: &str,
        cost: f64,
    ) -> Result<RateLimitDecision> {
        validate_cost(cost, "rate limit cost")?;

        let mut decision = RateLimitDecision::default();
        if !self.config.enabled {
            return Ok(decision);
        }

        for rule in self.rules_for(scope, provider) {
            let result = match self.check_rule(rule, scope, identifier, provider, cost).await {
                Ok(result) => result,
                Err(e) => {
                    self.refund(&decision.grants).await;
                    return Err(e);
                }
            };

            match result {
                (result, Some(grant)) => {
                    decision.grants.push(grant);
                    decision.results.push(result);
                }
                (result, None) => {
                    debug!(
                        "Rate limit exceeded for {} by rule '{}': {}/{}, retry after {:?}s",
                        result.key,
                        result.rule,
                        result.current_usage,
                        result.limit,
                        result.retry_after_secs
                    );
                    self.refund(&decision.grants).await;
                    return Err(result.to_error());
                }
            }
        }

        Ok(decision)
    }

    /// Check one rule, returning the grant when admitted
    pub async fn check_rule(
        &self,
        rule: &RateLimitRule,
        scope: Scope,
        identifier: &str,
        provider: &str,
        cost: f64,
    ) -> Result<(RateLimitResult, Option<RateLimitGrant>)> {
        validate_cost(cost, "rate limit cost")?;

        let key = limiter_key(rule, scope, identifier, provider);
        let storage_key = storage_key(rule, &key);
        let limit = rule.limit_for(identifier);
        let now = self.clock.now();

        match self.effective_strategy(rule) {
            RateLimitStrategy::TokenBucket => {
                self.check_token_bucket(rule, key, storage_key, limit, cost, now)
                    .await
            }
            RateLimitStrategy::SlidingWindow => {
                self.check_sliding_window(rule, key, storage_key, limit, cost, now)
                    .await
            }
            RateLimitStrategy::FixedWindow => {
                self.check_fixed_window(rule, key, storage_key, limit, cost, now)
                    .await
            }
        }
    }

    /// Give back grants taken by an admission that did not go through.
    ///
    /// Refund failures are logged, never returned: the caller is already on
    /// an error path.
    pub async fn refund(&self, grants: &[RateLimitGrant]) {
        for grant in grants.iter().rev() {
            if let Err(e) = self.refund_grant(grant).await {
                warn!(
                    "Failed to refund rate limit grant on {} (rule '{}'): {}",
                    grant.storage_key, grant.rule, e
                );
            }
        }
    }
}
