//! Storage configuration

use super::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Which state store to build
    #[serde(default)]
    pub backend: StorageBackend,
    /// Redis configuration, used by the redis and tiered backends
    #[serde(default)]
    pub redis: RedisConfig,
    /// Local cache tier, used by the tiered backend
    #[serde(default)]
    pub cache: CacheTierConfig,
    /// Compare-and-swap attempts before an update gives up
    #[serde(default = "default_cas_max_retries")]
    pub cas_max_retries: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            redis: RedisConfig::default(),
            cache: CacheTierConfig::default(),
            cas_max_retries: default_cas_max_retries(),
        }
    }
}

/// State store backend
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Process-local store, for single-node deployments and tests
    #[default]
    Memory,
    /// Redis only
    Redis,
    /// Local cache in front of Redis
    Tiered,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "redis" => Ok(StorageBackend::Redis),
            "tiered" => Ok(StorageBackend::Tiered),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
    /// Namespace prepended to every key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            connection_timeout: default_connection_timeout(),
            key_prefix: default_key_prefix(),
        }
    }
}

/// Local cache tier configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheTierConfig {
    /// Maximum cached keys
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: u64,
    /// Seconds an entry may be served without touching the durable tier
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheTierConfig {
    fn default() -> Self {
        Self {
            max_entries: default_cache_max_entries(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}
