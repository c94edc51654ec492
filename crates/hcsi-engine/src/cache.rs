//! In-memory backend cache (C2): the single shared mutable store the rest
//! of the engine reads and writes through.
//!
//! One `RwLock` guards the whole table: readers (the filter chain, HTTP
//! listing) take a shared lock, writers (register/unregister) take an
//! exclusive one. Plugin calls are network I/O and must never happen
//! while the lock is held — callers build a [`Backend`] first, then call
//! [`BackendCache::store`] to publish it.

use std::collections::HashMap;

use tokio::sync::{broadcast, RwLock};
use tracing::info;

use crate::error::CacheError;
use crate::model::{capacity, Backend};

/// Capacity of the availability-change broadcast channel. Generous enough
/// that a slow subscriber lags rather than drops a recent toggle; a lagged
/// subscriber just re-reads the cache's current state on resubscribe.
const STATUS_CHANNEL_CAPACITY: usize = 256;

/// `(backend name, now available)`, published on every `set_available`
/// transition for the background status-subscriber task to pick up.
pub type AvailabilityChange = (String, bool);

pub struct BackendCache {
    table: RwLock<HashMap<String, Backend>>,
    status_tx: broadcast::Sender<AvailabilityChange>,
}

impl Default for BackendCache {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendCache {
    #[must_use]
    pub fn new() -> Self {
        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            table: RwLock::new(HashMap::new()),
            status_tx,
        }
    }

    /// Insert or overwrite a backend entry.
    pub async fn store(&self, backend: Backend) {
        let name = backend.name.clone();
        self.table.write().await.insert(name.clone(), backend);
        info!(backend = %name, "backend stored in cache");
    }

    /// Clone of the cached backend, if present.
    pub async fn load(&self, name: &str) -> Option<Backend> {
        self.table.read().await.get(name).cloned()
    }

    /// Remove a backend entry and log its plugin out. The removal itself
    /// happens under the write lock; `Logout` runs afterward, lock-free,
    /// since it may perform network I/O.
    pub async fn delete(&self, name: &str) -> Option<Backend> {
        let removed = self.table.write().await.remove(name);
        if let Some(backend) = &removed {
            backend.plugin.logout().await;
            info!(backend = %name, "backend removed from cache");
        }
        removed
    }

    /// Drop every cached backend, logging each plugin out.
    pub async fn clear(&self) {
        let drained: Vec<Backend> = self.table.write().await.drain().map(|(_, b)| b).collect();
        for backend in &drained {
            backend.plugin.logout().await;
        }
        info!(count = drained.len(), "backend cache cleared");
    }

    /// Snapshot clones of every cached backend.
    pub async fn list(&self) -> Vec<Backend> {
        self.table.read().await.values().cloned().collect()
    }

    pub async fn count(&self) -> usize {
        self.table.read().await.len()
    }

    /// Log a human-readable dump of cache contents, grouped by family.
    pub async fn print_cache_content(&self) {
        let table = self.table.read().await;
        for backend in table.values() {
            info!(
                backend = %backend.name,
                storage = %backend.storage,
                available = backend.available,
                pools = backend.pools.len(),
                "cached backend"
            );
        }
    }

    /// Flip a backend's availability flag and publish the transition.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NotFound`] if the backend isn't cached.
    pub async fn set_available(&self, name: &str, available: bool) -> Result<(), CacheError> {
        let mut table = self.table.write().await;
        let backend = table.get_mut(name).ok_or_else(|| CacheError::NotFound(name.to_owned()))?;
        if backend.available != available {
            backend.available = available;
            drop(table);
            info!(backend = %name, available, "backend availability changed");
            let _ = self.status_tx.send((name.to_owned(), available));
        }
        Ok(())
    }

    /// Subscribe to availability-change events.
    #[must_use]
    pub fn subscribe_status(&self) -> broadcast::Receiver<AvailabilityChange> {
        self.status_tx.subscribe()
    }

    /// The cached backend that is `backend`'s hyper-metro sibling, if any
    /// is currently registered.
    pub async fn metro_sibling(&self, backend: &Backend) -> Option<Backend> {
        self.table
            .read()
            .await
            .values()
            .find(|other| backend.is_metro_sibling_of(other))
            .cloned()
    }

    /// The cached backend that is `backend`'s replication sibling, if any
    /// is currently registered.
    pub async fn replica_sibling(&self, backend: &Backend) -> Option<Backend> {
        self.table
            .read()
            .await
            .values()
            .find(|other| backend.is_replica_sibling_of(other))
            .cloned()
    }

    /// Atomically decrement a pool's `FreeCapacity` under the write lock,
    /// so a thick allocation's capacity reservation can never race another
    /// selection reading a stale free-capacity value.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NotFound`]/[`CacheError::PoolNotFound`] if the
    /// backend or pool is absent.
    pub async fn reserve_capacity(&self, backend: &str, pool: &str, bytes: i64) -> Result<(), CacheError> {
        let mut table = self.table.write().await;
        let backend = table.get_mut(backend).ok_or_else(|| CacheError::NotFound(backend.to_owned()))?;
        let backend_name = backend.name.clone();
        let pool = backend
            .pool_mut(pool)
            .ok_or_else(|| CacheError::PoolNotFound(backend_name, pool.to_owned()))?;
        let free = pool.capacities.entry(capacity::FREE_CAPACITY.to_owned()).or_insert(0);
        *free -= bytes;
        Ok(())
    }
}

impl std::fmt::Debug for BackendCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendCache").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::StoragePool;
    use hcsi_plugin::mock::MockPlugin;
    use std::sync::Arc;

    fn backend(name: &str) -> Backend {
        Backend {
            name: name.to_owned(),
            storage: "oceanstor-san".to_owned(),
            available: true,
            content_name: "v1".to_owned(),
            plugin: Arc::new(MockPlugin::new(name)),
            pools: vec![StoragePool::new("p1", name, "oceanstor-san")],
            parameters: HashMap::new(),
            supported_topologies: Vec::new(),
            account_name: String::new(),
            metro_domain: String::new(),
            metro_vstore_pair_id: String::new(),
            metro_backend_name: String::new(),
            replica_backend_name: String::new(),
        }
    }

    #[tokio::test]
    async fn store_then_load_round_trips() {
        let cache = BackendCache::new();
        cache.store(backend("b1")).await;
        assert!(cache.load("b1").await.is_some());
        assert_eq!(cache.count().await, 1);
    }

    #[tokio::test]
    async fn set_available_publishes_transition() {
        let cache = BackendCache::new();
        cache.store(backend("b1")).await;
        let mut rx = cache.subscribe_status();
        cache.set_available("b1", false).await.unwrap();
        let (name, available) = rx.try_recv().unwrap();
        assert_eq!(name, "b1");
        assert!(!available);
    }

    #[tokio::test]
    async fn set_available_on_unchanged_value_does_not_publish() {
        let cache = BackendCache::new();
        cache.store(backend("b1")).await;
        let mut rx = cache.subscribe_status();
        cache.set_available("b1", true).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn metro_sibling_resolved_on_demand() {
        let cache = BackendCache::new();
        let mut a = backend("b1");
        a.metro_backend_name = "b2".to_owned();
        a.metro_domain = "dom1".to_owned();
        let mut b = backend("b2");
        b.metro_backend_name = "b1".to_owned();
        b.metro_domain = "dom1".to_owned();
        cache.store(a.clone()).await;
        cache.store(b).await;

        let sibling = cache.metro_sibling(&a).await;
        assert_eq!(sibling.map(|s| s.name), Some("b2".to_owned()));
    }

    #[tokio::test]
    async fn reserve_capacity_decrements_atomically() {
        let cache = BackendCache::new();
        let mut b = backend("b1");
        b.pools[0].capacities.insert(capacity::FREE_CAPACITY.to_owned(), 1000);
        cache.store(b).await;

        cache.reserve_capacity("b1", "p1", 300).await.unwrap();
        let loaded = cache.load("b1").await.unwrap();
        assert_eq!(loaded.pool("p1").unwrap().free_capacity(), 700);
    }

    #[tokio::test]
    async fn reserve_capacity_on_missing_pool_errors() {
        let cache = BackendCache::new();
        cache.store(backend("b1")).await;
        assert!(cache.reserve_capacity("b1", "missing", 1).await.is_err());
    }
}
