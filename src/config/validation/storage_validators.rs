//! Storage configuration validators
//!
//! This module provides validation implementations for storage-related configuration
//! structures including StorageConfig, RedisConfig, and CacheTierConfig.

use super::trait_def::Validate;
use crate::config::models::*;
use tracing::debug;

impl Validate for StorageConfig {
    fn validate(&self) -> Result<(), String> {
        debug!("Validating storage configuration");

        if self.cas_max_retries == 0 {
            return Err("Storage CAS max retries must be greater than 0".to_string());
        }

        match self.backend {
            StorageBackend::Memory => {}
            StorageBackend::Redis => self.redis.validate()?,
            StorageBackend::Tiered => {
                self.redis.validate()?;
                self.cache.validate()?;
            }
        }

        Ok(())
    }
}

impl Validate for RedisConfig {
    fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("Redis URL cannot be empty".to_string());
        }

        if !self.url.starts_with("redis://") && !self.url.starts_with("rediss://") {
            return Err("Redis URL must start with redis:// or rediss://".to_string());
        }

        if self.connection_timeout == 0 {
            return Err("Redis connection timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Validate for CacheTierConfig {
    fn validate(&self) -> Result<(), String> {
        if self.max_entries == 0 {
            return Err("Cache tier max entries must be greater than 0".to_string());
        }

        if self.ttl_secs == 0 {
            return Err("Cache tier TTL must be greater than 0".to_string());
        }

        Ok(())
    }
}
