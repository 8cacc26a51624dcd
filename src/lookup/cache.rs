//! TTL cache.
//! [`CacheStore`] is the capability the lookup service depends on;
//! [`MemoryCache`] is the in-process implementation: one map behind a
//! reader/writer lock, lazy expiry on read plus a periodic sweep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::CacheError;

/// Default interval of the background expiry sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

/// Key/value store with per-entry expiry. Backends must treat an expired
/// entry exactly like an absent one.
#[async_trait]
pub trait CacheStore<V>: Send + Sync
where
    V: Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<V>, CacheError>;
    async fn set(&self, key: &str, value: &V, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;
}

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Volatile in-process cache.
pub struct MemoryCache<V> {
    inner: RwLock<HashMap<String, CacheEntry<V>>>,
}

impl<V> Default for MemoryCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> MemoryCache<V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Entries currently held, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut map = self.inner.write();
        let before = map.len();
        map.retain(|_, entry| !entry.is_expired(now));
        let removed = before - map.len();
        if removed > 0 {
            info!(removed, remaining = map.len(), "cache sweep");
        }
        removed
    }

    fn evict_if_expired(&self, key: &str) {
        let mut map = self.inner.write();
        if map.get(key).is_some_and(|e| e.is_expired(Instant::now())) {
            map.remove(key);
            debug!(key, "expired cache entry evicted on read");
        }
    }
}

impl<V> MemoryCache<V>
where
    V: Send + Sync + 'static,
{
    /// Sweep expired entries every `every` until `shutdown` fires or the
    /// cache is dropped.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        every: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.cancelled() => break,
                }
                let Some(cache) = weak.upgrade() else { break };
                cache.purge_expired();
            }
            debug!("cache sweeper stopped");
        })
    }
}

enum Slot<V> {
    Missing,
    Expired,
    Live(V),
}

impl<V: Clone> MemoryCache<V> {
    fn slot(&self, key: &str) -> Slot<V> {
        let map = self.inner.read();
        match map.get(key) {
            None => Slot::Missing,
            Some(entry) if entry.is_expired(Instant::now()) => Slot::Expired,
            Some(entry) => Slot::Live(entry.value.clone()),
        }
    }
}

#[async_trait]
impl<V> CacheStore<V> for MemoryCache<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<V>, CacheError> {
        match self.slot(key) {
            Slot::Live(value) => Ok(Some(value)),
            Slot::Expired => {
                self.evict_if_expired(key);
                Ok(None)
            }
            Slot::Missing => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &V, ttl: Duration) -> Result<(), CacheError> {
        // Round-trip through JSON so the stored copy shares nothing with the
        // caller's value.
        let stored: V = serde_json::from_slice(&serde_json::to_vec(value)?)?;
        let entry = CacheEntry {
            value: stored,
            expires_at: Instant::now() + ttl,
        };
        self.inner.write().insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.write().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(matches!(self.slot(key), Slot::Live(_)))
    }
}
