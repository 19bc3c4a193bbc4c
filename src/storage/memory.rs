//! In-process state store
//!
//! Backed by a sharded [`DashMap`]; compare-and-swap and increment run under
//! the shard lock of their key, which makes them atomic for every caller in
//! this process.

use super::StateStore;
use crate::utils::error::{AdmissionError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn new(value: String, ttl: Option<u64>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|secs| Instant::now() + Duration::from_secs(secs)),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory [`StateStore`]
#[derive(Debug)]
pub struct MemoryStore {
    entries: DashMap<String, MemoryEntry>,
    cas_enabled: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            cas_enabled: true,
        }
    }

    /// A store that only offers get/set and atomic counters, like a plain
    /// cache without scripting. Limiters fall back to fixed windows on it.
    pub fn without_compare_and_swap() -> Self {
        Self {
            entries: DashMap::new(),
            cas_enabled: false,
        }
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired keys
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| !entry.is_expired(now));
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> Result<()> {
        self.entries
            .insert(key.to_string(), MemoryEntry::new(value.to_string(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Option<u64>,
    ) -> Result<bool> {
        if !self.cas_enabled {
            return Err(AdmissionError::internal(
                "compare-and-swap is disabled on this memory store",
            ));
        }

        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = Some(occupied.get())
                    .filter(|entry| !entry.is_expired(now))
                    .map(|entry| entry.value.as_str());
                if current != expected {
                    return Ok(false);
                }
                occupied.insert(MemoryEntry::new(new.to_string(), ttl));
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                if expected.is_some() {
                    return Ok(false);
                }
                vacant.insert(MemoryEntry::new(new.to_string(), ttl));
                Ok(true)
            }
        }
    }

    async fn increment(&self, key: &str, delta: i64, ttl: Option<u64>) -> Result<i64> {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| MemoryEntry::new("0".to_string(), ttl));

        if entry.is_expired(now) {
            *entry = MemoryEntry::new("0".to_string(), ttl);
        }

        let current: i64 = entry.value.parse().map_err(|_| {
            AdmissionError::internal(format!("value at '{}' is not an integer counter", key))
        })?;
        let updated = current + delta;
        entry.value = updated.to_string();
        Ok(updated)
    }

    fn supports_compare_and_swap(&self) -> bool {
        self.cas_enabled
    }
}
