//! Basic Redis key operations
//!
//! This module provides get, set, delete and ttl.

use super::pool::RedisPool;
use crate::utils::error::Result;
use redis::AsyncCommands;

impl RedisPool {
    /// Get a value
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.get_connection();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    /// Set a key-value pair with optional TTL
    pub async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> Result<()> {
        let mut conn = self.get_connection();
        if let Some(ttl_seconds) = ttl {
            let _: () = conn.set_ex(key, value, ttl_seconds).await?;
        } else {
            let _: () = conn.set(key, value).await?;
        }
        Ok(())
    }

    /// Delete a key
    pub async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.get_connection();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    /// Get time to live for a key
    pub async fn ttl(&self, key: &str) -> Result<i64> {
        let mut conn = self.get_connection();
        let ttl: i64 = conn.ttl(key).await?;
        Ok(ttl)
    }
}
