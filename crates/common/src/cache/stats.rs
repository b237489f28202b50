//! Cache statistics
//!
//! Counters are atomics shared by clones of a store, so reading them never
//! contends with request traffic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries currently stored
    pub entries: usize,

    /// Lookups that found an entry
    pub hits: u64,

    /// Lookups that found nothing
    pub misses: u64,

    /// Entries written (new or overwritten)
    pub stores: u64,

    /// Entries removed by `invalidate`
    pub invalidations: u64,
}

impl CacheStats {
    /// hits / (hits + misses); 0 when nothing was looked up
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_lookups();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    #[must_use]
    pub const fn total_lookups(&self) -> u64 {
        self.hits + self.misses
    }
}

/// Lock-free counter set behind [`CacheStats`]
#[derive(Debug, Clone, Default)]
pub(crate) struct MetricsCollector {
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    stores: Arc<AtomicU64>,
    invalidations: Arc<AtomicU64>,
}

impl MetricsCollector {
    pub(crate) fn record_lookup(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_store(&self) {
        self.stores.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reset(&self) {
        for counter in [&self.hits, &self.misses, &self.stores, &self.invalidations] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self, entries: usize) -> CacheStats {
        CacheStats {
            entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        assert!((CacheStats::default().hit_rate() - 0.0).abs() < f64::EPSILON);

        let metrics = MetricsCollector::default();
        metrics.record_lookup(true);
        metrics.record_lookup(true);
        metrics.record_lookup(true);
        metrics.record_lookup(false);
        let stats = metrics.snapshot(3);
        assert_eq!(stats.total_lookups(), 4);
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = MetricsCollector::default();
        metrics.clone().record_store();
        assert_eq!(metrics.snapshot(0).stores, 1);
        metrics.reset();
        assert_eq!(metrics.snapshot(0).stores, 0);
    }
}
