//! Redis connection management
//!
//! This module provides Redis connectivity and health checks.

use crate::config::RedisConfig;
use crate::utils::error::{AdmissionError, Result};
use redis::{Client, aio::MultiplexedConnection};
use std::time::Duration;
use tracing::{debug, info};

/// Multiplexed Redis connection shared by all callers
#[derive(Clone)]
pub struct RedisPool {
    /// Multiplexed connection
    pub(crate) connection: MultiplexedConnection,
    /// Configuration
    pub(crate) config: RedisConfig,
}

impl std::fmt::Debug for RedisPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisPool")
            .field("url", &Self::sanitize_url(&self.config.url))
            .finish()
    }
}

impl RedisPool {
    /// Connect to Redis
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        info!("Creating Redis connection");
        debug!("Redis URL: {}", Self::sanitize_url(&config.url));

        let client = Client::open(config.url.as_str())?;

        let timeout = Duration::from_secs(config.connection_timeout);
        let connection = tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| {
                AdmissionError::store_unavailable(format!(
                    "timed out connecting to {} after {}s",
                    Self::sanitize_url(&config.url),
                    config.connection_timeout
                ))
            })??;

        info!("Redis connection created successfully");
        Ok(Self {
            connection,
            config: config.clone(),
        })
    }

    /// Get a handle on the multiplexed connection
    pub fn get_connection(&self) -> MultiplexedConnection {
        self.connection.clone()
    }

    /// Prefix applied to every key
    pub fn key_prefix(&self) -> &str {
        &self.config.key_prefix
    }

    /// Health check
    pub async fn health_check(&self) -> Result<()> {
        debug!("Performing Redis health check");
        let mut conn = self.get_connection();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        debug!("Redis health check passed");
        Ok(())
    }

    /// Sanitize Redis URL for logging (hide password)
    pub(crate) fn sanitize_url(url: &str) -> String {
        if let Ok(parsed) = url::Url::parse(url) {
            let mut sanitized = parsed.clone();
            if sanitized.password().is_some() {
                let _ = sanitized.set_password(Some("***"));
            }
            sanitized.to_string()
        } else {
            "invalid_url".to_string()
        }
    }
}
