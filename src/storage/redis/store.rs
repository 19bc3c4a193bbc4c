//! [`StateStore`] over Redis

use super::pool::RedisPool;
use crate::config::RedisConfig;
use crate::storage::StateStore;
use crate::utils::error::Result;
use async_trait::async_trait;

/// Redis-backed durable [`StateStore`]
#[derive(Debug, Clone)]
pub struct RedisStore {
    pool: RedisPool,
}

impl RedisStore {
    /// Connect and verify the server answers
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let pool = RedisPool::new(config).await?;
        pool.health_check().await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: RedisPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &RedisPool {
        &self.pool
    }

    fn namespaced(&self, key: &str) -> String {
        namespaced_key(self.pool.key_prefix(), key)
    }
}

pub(super) fn namespaced_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}:{}", prefix, key)
    }
}

#[async_trait]
impl StateStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.pool.get(&self.namespaced(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> Result<()> {
        self.pool.set(&self.namespaced(key), value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.pool.delete(&self.namespaced(key)).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Option<u64>,
    ) -> Result<bool> {
        self.pool
            .compare_and_swap(&self.namespaced(key), expected, new, ttl)
            .await
    }

    async fn increment(&self, key: &str, delta: i64, ttl: Option<u64>) -> Result<i64> {
        self.pool.increment(&self.namespaced(key), delta, ttl).await
    }
}
