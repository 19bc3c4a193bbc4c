//! Cache tier in front of a durable store
//!
//! Reads are served from a local [`moka`] cache and fall through to the
//! durable tier on a miss. Every write goes to the durable tier first, which
//! stays the single source of truth; the cache is refreshed on success and
//! invalidated whenever a swap loses, so a stale cached read can only ever
//! cost one extra CAS round.

use super::StateStore;
use crate::config::CacheTierConfig;
use crate::utils::error::Result;
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Two-tier [`StateStore`]
#[derive(Debug)]
pub struct TieredStore {
    cache: Cache<String, String>,
    durable: Arc<dyn StateStore>,
}

impl TieredStore {
    pub fn new(durable: Arc<dyn StateStore>, config: &CacheTierConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(Duration::from_secs(config.ttl_secs))
            .build();

        Self { cache, durable }
    }

    /// The durable tier
    pub fn durable(&self) -> &Arc<dyn StateStore> {
        &self.durable
    }

    /// Drop every cached entry, e.g. after a restart of the durable tier
    pub fn clear_cache(&self) {
        self.cache.invalidate_all();
    }
}

#[async_trait]
impl StateStore for TieredStore {
    fn name(&self) -> &'static str {
        "tiered"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        if let Some(value) = self.cache.get(key).await {
            return Ok(Some(value));
        }

        debug!("Cache miss for {}, reading durable tier", key);
        let value = self.durable.get(key).await?;
        if let Some(ref v) = value {
            self.cache.insert(key.to_string(), v.clone()).await;
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> Result<()> {
        self.durable.set(key, value, ttl).await?;
        self.cache.insert(key.to_string(), value.to_string()).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.durable.delete(key).await?;
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Option<u64>,
    ) -> Result<bool> {
        let swapped = self
            .durable
            .compare_and_swap(key, expected, new, ttl)
            .await?;

        if swapped {
            self.cache.insert(key.to_string(), new.to_string()).await;
        } else {
            self.cache.invalidate(key).await;
        }
        Ok(swapped)
    }

    async fn increment(&self, key: &str, delta: i64, ttl: Option<u64>) -> Result<i64> {
        let value = self.durable.increment(key, delta, ttl).await?;
        self.cache.invalidate(key).await;
        Ok(value)
    }

    fn supports_compare_and_swap(&self) -> bool {
        self.durable.supports_compare_and_swap()
    }
}
