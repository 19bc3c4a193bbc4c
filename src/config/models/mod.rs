//! Configuration data models
//!
//! This module defines all configuration structures used by the admission engine.

#![allow(missing_docs)]

pub mod admission;
pub mod logging;
pub mod quota;
pub mod rate_limit;
pub mod storage;

// Re-export all configuration types
pub use admission::*;
pub use logging::*;
pub use quota::*;
pub use rate_limit::*;
pub use storage::*;

/// Default values for configuration
pub fn default_true() -> bool {
    true
}

/// Default rate limit window in seconds
pub fn default_window_secs() -> u64 {
    60
}

/// Default warning threshold in percent of the limit
pub fn default_warn_threshold() -> f64 {
    80.0
}

/// Default alert threshold in percent of the limit
pub fn default_alert_threshold() -> f64 {
    95.0
}

pub fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

pub fn default_connection_timeout() -> u64 {
    5
}

pub fn default_key_prefix() -> String {
    "llm-admission".to_string()
}

pub fn default_cache_max_entries() -> u64 {
    10_000
}

/// Cache tier TTL in seconds; kept short since every write goes to the durable tier
pub fn default_cache_ttl_secs() -> u64 {
    1
}

pub fn default_cas_max_retries() -> u32 {
    crate::storage::DEFAULT_CAS_MAX_RETRIES
}

pub fn default_log_level() -> String {
    "info".to_string()
}
