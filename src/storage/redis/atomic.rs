//! Redis atomic operations
//!
//! Compare-and-swap and counter creation with a TTL are not single Redis
//! commands, so both run as Lua scripts, which Redis executes atomically.

use super::pool::RedisPool;
use crate::utils::error::Result;
use redis::Script;
use std::sync::LazyLock;

/// KEYS[1] = key, ARGV[1] = "1" if the key must be absent,
/// ARGV[2] = expected value, ARGV[3] = new value, ARGV[4] = ttl (0 = none)
static COMPARE_AND_SWAP: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
local current = redis.call('GET', KEYS[1])
if ARGV[1] == '1' then
    if current then return 0 end
else
    if (not current) or current ~= ARGV[2] then return 0 end
end
local ttl = tonumber(ARGV[4])
if ttl > 0 then
    redis.call('SET', KEYS[1], ARGV[3], 'EX', ttl)
else
    redis.call('SET', KEYS[1], ARGV[3])
end
return 1
"#,
    )
});

/// KEYS[1] = key, ARGV[1] = delta, ARGV[2] = ttl applied on creation (0 = none)
static INCREMENT_WITH_TTL: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
local value = redis.call('INCRBY', KEYS[1], ARGV[1])
local ttl = tonumber(ARGV[2])
if ttl > 0 and redis.call('TTL', KEYS[1]) < 0 then
    redis.call('EXPIRE', KEYS[1], ttl)
end
return value
"#,
    )
});

impl RedisPool {
    /// Replace the value at `key` only if it still equals `expected`
    pub async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Option<u64>,
    ) -> Result<bool> {
        let mut conn = self.get_connection();
        let must_be_absent = if expected.is_none() { "1" } else { "0" };
        let swapped: i64 = COMPARE_AND_SWAP
            .key(key)
            .arg(must_be_absent)
            .arg(expected.unwrap_or(""))
            .arg(new)
            .arg(ttl.unwrap_or(0))
            .invoke_async(&mut conn)
            .await?;
        Ok(swapped == 1)
    }

    /// Increment key value by delta, applying `ttl` when the key has none
    pub async fn increment(&self, key: &str, delta: i64, ttl: Option<u64>) -> Result<i64> {
        let mut conn = self.get_connection();
        let value: i64 = INCREMENT_WITH_TTL
            .key(key)
            .arg(delta)
            .arg(ttl.unwrap_or(0))
            .invoke_async(&mut conn)
            .await?;
        Ok(value)
    }
}
