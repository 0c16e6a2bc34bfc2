//! Shared counter storage backing the rate limiter.
//!
//! The limiter only needs a key/value store of integer counters with per-key
//! expiry. Keeping it behind a trait lets the limiter run against the
//! in-memory store here, or a shared store in a multi-instance deployment,
//! without touching the window arithmetic.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// The store could not be reached or refused the operation.
#[derive(Debug, Error)]
#[error("counter store unavailable: {0}")]
pub struct StoreError(pub String);

/// Key/value store of expiring integer counters.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current value for `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError>;

    /// Store `value` under `key`, expiring after `ttl`.
    async fn put(&self, key: &str, value: u64, ttl: Duration) -> Result<(), StoreError>;
}

/// In-memory counter store with lazy expiry.
///
/// Expired entries are skipped on read and reclaimed by [`prune`], which the
/// server runs on an interval.
///
/// [`prune`]: MemoryCounterStore::prune
#[derive(Default)]
pub struct MemoryCounterStore {
    entries: RwLock<HashMap<String, (u64, Instant)>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all expired entries.
    pub async fn prune(&self) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, (_, expires)| *expires > now);
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(value, _)| *value))
    }

    async fn put(&self, key: &str, value: u64, ttl: Duration) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }
}
