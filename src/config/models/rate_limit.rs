//! Rate limiting configuration

use super::*;
use crate::core::scope::Scope;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Rules, evaluated global first, then narrower scopes
    #[serde(default)]
    pub rules: Vec<RateLimitRule>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rules: Vec::new(),
        }
    }
}

/// One limiter applied to every key of a scope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitRule {
    /// Rule name, unique within the config
    pub name: String,
    /// Scope whose identifiers this rule keys on
    pub scope: Scope,
    /// Rate limiting strategy
    #[serde(default)]
    pub strategy: RateLimitStrategy,
    /// Bucket capacity or window admission limit, in cost units
    pub limit: f64,
    /// Window length; the bucket refills `limit` per window
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Keep a separate limiter per provider
    #[serde(default)]
    pub per_provider: bool,
    /// Providers this rule applies to; empty means all
    #[serde(default)]
    pub providers: Vec<String>,
    /// Per-identifier limits replacing `limit`
    #[serde(default)]
    pub overrides: HashMap<String, f64>,
}

impl RateLimitRule {
    pub fn new(name: impl Into<String>, scope: Scope, limit: f64, window_secs: u64) -> Self {
        Self {
            name: name.into(),
            scope,
            strategy: RateLimitStrategy::default(),
            limit,
            window_secs,
            per_provider: false,
            providers: Vec::new(),
            overrides: HashMap::new(),
        }
    }

    pub fn with_strategy(mut self, strategy: RateLimitStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn per_provider(mut self) -> Self {
        self.per_provider = true;
        self
    }

    /// Whether the rule covers requests to `provider`
    pub fn applies_to_provider(&self, provider: &str) -> bool {
        self.providers.is_empty() || self.providers.iter().any(|p| p == provider)
    }

    /// Effective limit for an identifier
    pub fn limit_for(&self, identifier: &str) -> f64 {
        self.overrides.get(identifier).copied().unwrap_or(self.limit)
    }
}

/// Rate limiting strategy
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitStrategy {
    /// Token bucket algorithm
    #[default]
    TokenBucket,
    /// Fixed window
    FixedWindow,
    /// Sliding window
    SlidingWindow,
}

impl RateLimitStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitStrategy::TokenBucket => "token_bucket",
            RateLimitStrategy::FixedWindow => "fixed_window",
            RateLimitStrategy::SlidingWindow => "sliding_window",
        }
    }
}

impl std::fmt::Display for RateLimitStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
