//! In-process cache store

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::stats::{CacheStats, MetricsCollector};
use super::store::{CacheEntry, CacheError, CacheStore};

/// `HashMap`-backed store; contents die with the process
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
    metrics: MetricsCollector,
}

impl MemoryCacheStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let entry = self.entries.read().get(key).cloned();
        self.metrics.record_lookup(entry.is_some());
        Ok(entry)
    }

    async fn put(&self, entry: CacheEntry) -> Result<(), CacheError> {
        self.entries.write().insert(entry.key.clone(), entry);
        self.metrics.record_store();
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        if self.entries.write().remove(key).is_some() {
            self.metrics.record_invalidation();
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.entries.write().clear();
        self.metrics.reset();
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        self.metrics.snapshot(self.len())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    /// Validates the memory store lifecycle.
    ///
    /// Assertions:
    /// - Entries are retrievable after `put` and overwritten by a second `put`.
    /// - `invalidate` and `clear` remove entries.
    /// - Stats count hits, misses and stores.
    #[tokio::test]
    async fn test_memory_store_lifecycle() {
        let store = MemoryCacheStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.put(CacheEntry::new("k", "\"v1\"", Bytes::from_static(b"one"))).await.unwrap();
        store.put(CacheEntry::new("k", "\"v2\"", Bytes::from_static(b"two"))).await.unwrap();

        let entry = store.get("k").await.unwrap().unwrap();
        assert_eq!(entry.etag, "\"v2\"");
        assert_eq!(entry.body, Bytes::from_static(b"two"));

        let stats = store.stats();
        assert_eq!((stats.entries, stats.hits, stats.misses, stats.stores), (1, 1, 1, 2));

        store.invalidate("k").await.unwrap();
        assert!(store.is_empty());
        assert_eq!(store.stats().invalidations, 1);

        store.put(CacheEntry::new("j", "\"x\"", Bytes::new())).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.is_empty());
    }
}
