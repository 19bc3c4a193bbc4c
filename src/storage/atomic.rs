//! Optimistic read-modify-write over a [`StateStore`]
//!
//! State is stored as JSON. An update reads the current value, lets the
//! caller compute the next state, and writes it back with compare-and-swap,
//! retrying when another writer got there first. The store provides the
//! atomicity; the per-key in-process lock only keeps local callers from
//! burning retries against each other.
//!
//! On a store without compare-and-swap the per-key lock is all there is:
//! updates are get, apply, set under the lock, which is atomic only among
//! callers sharing this updater.

use super::StateStore;
use crate::utils::error::{AdmissionError, Result};
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, warn};

/// Default number of compare-and-swap attempts per update
pub const DEFAULT_CAS_MAX_RETRIES: u32 = 64;

/// Outcome of an update closure
#[derive(Debug)]
pub enum Update<T, R> {
    /// Persist the new state and return the output
    Write(T, R),
    /// Leave the stored state untouched and return the output
    Keep(R),
}

/// What to do with stored state that no longer decodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unreadable {
    /// Treat it as absent so it is rebuilt from defaults and overwritten
    Rebuild,
    /// Fail with a serialization error and leave it in place
    Fail,
}

/// In-process locks keyed by state key
#[derive(Debug, Default)]
pub struct KeyLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Guard returned by [`KeyLocks::lock`]; releases the slot on drop
pub struct KeyLockGuard<'a> {
    key: String,
    owner: &'a KeyLocks,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize local callers on `key`
    pub async fn lock(&self, key: &str) -> KeyLockGuard<'_> {
        let mutex = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        KeyLockGuard {
            key: key.to_string(),
            owner: self,
            guard: Some(guard),
        }
    }

    /// Number of keys with a live lock slot
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for KeyLockGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map still holds the mutex once nobody waits on it
        self.owner
            .locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// Runs JSON state updates against a store with bounded CAS retries
#[derive(Debug)]
pub struct AtomicUpdater {
    store: Arc<dyn StateStore>,
    locks: KeyLocks,
    max_retries: u32,
    compare_and_swap: bool,
}

impl AtomicUpdater {
    pub fn new(store: Arc<dyn StateStore>, max_retries: u32) -> Self {
        let compare_and_swap = store.supports_compare_and_swap();
        if !compare_and_swap {
            warn!(
                "State store '{}' cannot compare-and-swap; state updates are atomic within this process only",
                store.name()
            );
        }

        Self {
            store,
            locks: KeyLocks::new(),
            max_retries: max_retries.max(1),
            compare_and_swap,
        }
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Read and decode the state at `key`; unreadable state reads as absent
    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.load_with(key, Unreadable::Rebuild).await
    }

    /// Read and decode the state at `key`
    pub async fn load_with<T: DeserializeOwned>(
        &self,
        key: &str,
        unreadable: Unreadable,
    ) -> Result<Option<T>> {
        let raw = self.store.get(key).await?;
        decode(key, raw.as_deref(), unreadable)
    }

    /// Atomically transform the state at `key`, rebuilding unreadable state.
    ///
    /// `apply` may run several times; it must be a pure function of the state
    /// it is given.
    pub async fn update<T, R, F>(&self, key: &str, ttl: Option<u64>, apply: F) -> Result<R>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(Option<T>) -> Result<Update<T, R>>,
    {
        self.update_with(key, ttl, Unreadable::Rebuild, apply).await
    }

    /// [`update`](Self::update) with an explicit policy for unreadable state
    pub async fn update_with<T, R, F>(
        &self,
        key: &str,
        ttl: Option<u64>,
        unreadable: Unreadable,
        mut apply: F,
    ) -> Result<R>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(Option<T>) -> Result<Update<T, R>>,
    {
        let _local = self.locks.lock(key).await;

        if !self.compare_and_swap {
            let raw = self.store.get(key).await?;
            return match apply(decode(key, raw.as_deref(), unreadable)?)? {
                Update::Keep(output) => Ok(output),
                Update::Write(next, output) => {
                    let encoded = serde_json::to_string(&next)?;
                    self.store.set(key, &encoded, ttl).await?;
                    Ok(output)
                }
            };
        }

        for attempt in 0..self.max_retries {
            let raw = self.store.get(key).await?;
            let current = decode(key, raw.as_deref(), unreadable)?;

            match apply(current)? {
                Update::Keep(output) => return Ok(output),
                Update::Write(next, output) => {
                    let encoded = serde_json::to_string(&next)?;
                    if self
                        .store
                        .compare_and_swap(key, raw.as_deref(), &encoded, ttl)
                        .await?
                    {
                        return Ok(output);
                    }
                    debug!("CAS conflict on {} (attempt {})", key, attempt + 1);
                }
            }
        }

        Err(AdmissionError::conflict(format!(
            "gave up updating '{}' after {} contended attempts",
            key, self.max_retries
        )))
    }

    /// Delete the state at `key`, readable or not
    pub async fn remove(&self, key: &str) -> Result<()> {
        let _local = self.locks.lock(key).await;
        self.store.delete(key).await
    }
}

fn decode<T: DeserializeOwned>(
    key: &str,
    raw: Option<&str>,
    unreadable: Unreadable,
) -> Result<Option<T>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match serde_json::from_str(raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => match unreadable {
            Unreadable::Rebuild => {
                warn!("Discarding unreadable state at {}: {}", key, e);
                Ok(None)
            }
            Unreadable::Fail => {
                error!("Unreadable state at {}: {}", key, e);
                Err(e.into())
            }
        },
    }
}
