//! Storage layer for admission state
//!
//! Every limiter and quota key lives in a [`StateStore`]. Stores should offer
//! an atomic read-modify-write primitive per key: compare-and-swap for the
//! token bucket, sliding window and quotas, and a native atomic counter for
//! the fixed-window fallback. Without compare-and-swap, rate limits fall back
//! to fixed windows and quota updates are serialized by in-process key locks.

/// Optimistic update helpers
pub mod atomic;
/// In-process store
pub mod memory;
/// Redis store
#[cfg(feature = "redis")]
pub mod redis;
/// Cache tier in front of a durable store
pub mod tiered;

pub use atomic::{AtomicUpdater, DEFAULT_CAS_MAX_RETRIES, KeyLocks, Unreadable, Update};
pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis::{RedisPool, RedisStore};
pub use tiered::TieredStore;

use crate::config::{StorageBackend, StorageConfig};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::info;

/// Key-value store holding serialized limiter and quota state
#[async_trait]
pub trait StateStore: Send + Sync + Debug {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Read a value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value with an optional TTL in seconds
    async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> Result<()>;

    /// Remove a value
    async fn delete(&self, key: &str) -> Result<()>;

    /// Write `new` only if the current value equals `expected`
    /// (`None` meaning absent). Returns whether the swap happened.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Option<u64>,
    ) -> Result<bool>;

    /// Atomically add `delta` to an integer counter, creating it at zero.
    /// The TTL is applied when the counter is created.
    async fn increment(&self, key: &str, delta: i64, ttl: Option<u64>) -> Result<i64>;

    /// Whether [`StateStore::compare_and_swap`] is supported
    fn supports_compare_and_swap(&self) -> bool {
        true
    }
}

/// Build the store described by the storage configuration
pub async fn build_state_store(config: &StorageConfig) -> Result<Arc<dyn StateStore>> {
    info!("Initializing {:?} state store", config.backend);

    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        #[cfg(feature = "redis")]
        StorageBackend::Redis => Ok(Arc::new(RedisStore::connect(&config.redis).await?)),
        #[cfg(feature = "redis")]
        StorageBackend::Tiered => {
            let durable: Arc<dyn StateStore> = Arc::new(RedisStore::connect(&config.redis).await?);
            Ok(Arc::new(TieredStore::new(durable, &config.cache)))
        }
        #[cfg(not(feature = "redis"))]
        StorageBackend::Redis | StorageBackend::Tiered => Err(crate::utils::error::AdmissionError::config(
            "redis-backed storage requires the `redis` feature",
        )),
    }
}
