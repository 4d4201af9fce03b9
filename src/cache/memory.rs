//! In-process snapshot cache.

use crate::cache::{CacheEntry, CacheKey, CacheLayer};
use crate::core::clock::{Clock, SystemClock};
use crate::kpi::MetricSnapshot;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Snapshot cache backed by a sharded concurrent map.
///
/// Each shard has its own lock, so reads and writes of one key are
/// serialized while unrelated keys proceed independently.
pub struct MemoryCache {
    entries: DashMap<CacheKey, CacheEntry>,
    clock: Arc<dyn Clock>,
}

impl MemoryCache {
    /// Create a cache on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a cache on a custom clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Stored entry for a key, expired or not.
    pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.get(key).map(|e| e.value().clone())
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheLayer for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Option<MetricSnapshot> {
        let now = self.clock.now();
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
            Some(_) => {}
            None => return None,
        }

        // The shard guard is released; purge unless a writer refreshed it meanwhile.
        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired(now))
            .is_some()
        {
            tracing::debug!(key = %key, "cache entry expired");
        }
        None
    }

    async fn set(&self, key: CacheKey, snapshot: MetricSnapshot, ttl: Duration) {
        let entry = CacheEntry::new(key.clone(), snapshot, self.clock.now(), ttl);
        self.entries.insert(key, entry);
    }

    async fn invalidate(&self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    async fn invalidate_kpi(&self, kpi_id: &str) -> usize {
        let mut dropped = 0;
        self.entries.retain(|key, _| {
            let keep = key.kpi_id != kpi_id;
            if !keep {
                dropped += 1;
            }
            keep
        });
        dropped
    }

    async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut dropped = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                dropped += 1;
            }
            keep
        });
        dropped
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
