//! Redis state store
//!
//! This module provides the Redis-backed durable tier.
//!
//! ## Module Structure
//!
//! - `pool` - Connection management and health checks
//! - `cache` - Basic key operations (get, set, delete, expire, ttl)
//! - `atomic` - Scripted compare-and-swap and counters
//! - `store` - [`StateStore`](super::StateStore) implementation
//! - `tests` - Module tests

mod atomic;
mod cache;
mod pool;
mod store;

// Re-export public types
pub use pool::RedisPool;
pub use store::RedisStore;
