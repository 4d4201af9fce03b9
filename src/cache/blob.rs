//! Blob snapshot cache.
//!
//! Keeps each snapshot as an encoded blob keyed by its string cache key,
//! the same shape an out-of-process key/value cache holds. The expiry
//! travels inside the blob.

use crate::cache::codec::SnapshotCodec;
use crate::cache::{expiry, CacheKey, CacheLayer};
use crate::core::clock::{Clock, SystemClock};
use crate::core::Timestamp;
use crate::kpi::MetricSnapshot;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Snapshot cache over encoded blobs.
pub struct BlobCache {
    blobs: DashMap<String, Vec<u8>>,
    clock: Arc<dyn Clock>,
}

impl BlobCache {
    /// Create a cache on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a cache on a custom clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            blobs: DashMap::new(),
            clock,
        }
    }

    /// Total encoded bytes held.
    pub fn stored_bytes(&self) -> usize {
        self.blobs.iter().map(|b| b.value().len()).sum()
    }

    /// Remove the blob under `name` unless it is live at `now`.
    ///
    /// The check runs under the shard lock, so a blob written since the
    /// caller's read is kept.
    fn drop_if_stale(&self, name: &str, now: Timestamp) -> bool {
        self.blobs
            .remove_if(name, |_, blob| !is_live(blob, now))
            .is_some()
    }

    /// Store raw bytes under a key, bypassing the codec.
    pub fn put_raw(&self, key: &CacheKey, bytes: Vec<u8>) {
        self.blobs.insert(key.to_string(), bytes);
    }
}

/// Whether a blob decodes and is unexpired at `now`.
fn is_live(blob: &[u8], now: Timestamp) -> bool {
    matches!(SnapshotCodec::decode(blob), Ok((_, expires_at)) if now < expires_at)
}

impl Default for BlobCache {
    fn default() -> Self {
        Self::new()
    }
}

fn belongs_to(key: &str, kpi_id: &str) -> bool {
    CacheKey::parse(key).is_some_and(|k| k.kpi_id == kpi_id)
}

#[async_trait]
impl CacheLayer for BlobCache {
    async fn get(&self, key: &CacheKey) -> Option<MetricSnapshot> {
        let name = key.to_string();
        let now = self.clock.now();

        let decoded = match self.blobs.get(&name) {
            Some(blob) => SnapshotCodec::decode(blob.value()),
            None => return None,
        };

        match decoded {
            Ok((snapshot, expires_at)) if now < expires_at => Some(snapshot),
            Ok(_) => {
                if self.drop_if_stale(&name, now) {
                    tracing::debug!(key = %name, "cache blob expired");
                }
                None
            }
            Err(e) => {
                if self.drop_if_stale(&name, now) {
                    tracing::warn!(key = %name, error = %e, "dropping undecodable cache blob");
                }
                None
            }
        }
    }

    async fn set(&self, key: CacheKey, snapshot: MetricSnapshot, ttl: Duration) {
        let expires_at = expiry(self.clock.now(), ttl);
        match SnapshotCodec::encode(&snapshot, expires_at) {
            Ok(bytes) => {
                self.blobs.insert(key.to_string(), bytes);
            }
            Err(e) => {
                // An unencodable snapshot is simply not cached; the next read recomputes.
                self.blobs.remove(&key.to_string());
                tracing::warn!(key = %key, error = %e, "failed to encode snapshot");
            }
        }
    }

    async fn invalidate(&self, key: &CacheKey) -> bool {
        self.blobs.remove(&key.to_string()).is_some()
    }

    async fn invalidate_kpi(&self, kpi_id: &str) -> usize {
        let mut dropped = 0;
        self.blobs.retain(|key, _| {
            let keep = !belongs_to(key, kpi_id);
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
        self.blobs.retain(|_, blob| {
            let keep = is_live(blob, now);
            if !keep {
                dropped += 1;
            }
            keep
        });
        dropped
    }

    fn len(&self) -> usize {
        self.blobs.len()
    }

    fn backend(&self) -> &'static str {
        "blob"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::core::TimeWindow;
    use crate::kpi::KpiUnit;
    use chrono::{TimeZone, Utc};

    fn snapshot(kpi_id: &str, value: f64) -> MetricSnapshot {
        let at = Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap();
        MetricSnapshot {
            kpi_id: kpi_id.to_string(),
            value,
            unit: KpiUnit::Percent,
            target: 30.0,
            computed_at: at,
            source_window: TimeWindow::trailing(at, chrono::Duration::days(7)).unwrap(),
            param_hash: "abc".to_string(),
        }
    }

    fn key(kpi_id: &str) -> CacheKey {
        CacheKey {
            kpi_id: kpi_id.to_string(),
            param_hash: "abc".to_string(),
        }
    }

    fn setup() -> (Arc<ManualClock>, BlobCache) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap(),
        ));
        let cache = BlobCache::with_clock(clock.clone());
        (clock, cache)
    }

    #[tokio::test]
    async fn test_set_get_and_expire() {
        let (clock, cache) = setup();
        cache.set(key("close_rate"), snapshot("close_rate", 27.5), Duration::from_secs(60)).await;

        assert_eq!(cache.get(&key("close_rate")).await, Some(snapshot("close_rate", 27.5)));
        assert!(cache.stored_bytes() > 0);

        clock.advance(chrono::Duration::seconds(60));
        assert_eq!(cache.get(&key("close_rate")).await, None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_blob_reads_as_miss() {
        let (_, cache) = setup();
        cache.put_raw(&key("close_rate"), vec![0xde, 0xad, 0xbe, 0xef, 0x00]);

        assert_eq!(cache.get(&key("close_rate")).await, None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_kpi_matches_whole_id() {
        let (_, cache) = setup();
        cache.set(key("rate"), snapshot("rate", 1.0), Duration::from_secs(60)).await;
        cache.set(key("rate:north"), snapshot("rate:north", 2.0), Duration::from_secs(60)).await;

        assert_eq!(cache.invalidate_kpi("rate").await, 1);
        assert!(cache.get(&key("rate:north")).await.is_some());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (clock, cache) = setup();
        cache.set(key("a"), snapshot("a", 1.0), Duration::from_secs(30)).await;
        cache.set(key("b"), snapshot("b", 2.0), Duration::from_secs(300)).await;

        clock.advance(chrono::Duration::seconds(31));
        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.invalidate(&key("b")).await);
    }

    #[tokio::test]
    async fn test_expiry_purge_keeps_rewritten_blob() {
        let (clock, cache) = setup();
        cache.set(key("close_rate"), snapshot("close_rate", 27.5), Duration::from_secs(60)).await;
        clock.advance(chrono::Duration::seconds(61));
        let read_at = clock.now();

        // A writer replaces the expired blob after a reader decoded it.
        cache.set(key("close_rate"), snapshot("close_rate", 31.0), Duration::from_secs(60)).await;
        assert!(!cache.drop_if_stale(&key("close_rate").to_string(), read_at));
        assert_eq!(cache.get(&key("close_rate")).await, Some(snapshot("close_rate", 31.0)));

        clock.advance(chrono::Duration::seconds(60));
        assert!(cache.drop_if_stale(&key("close_rate").to_string(), clock.now()));
        assert!(cache.is_empty());
    }
}
