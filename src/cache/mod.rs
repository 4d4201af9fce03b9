//! Cache Module
//!
//! TTL caching of computed snapshots:
//! - `CacheLayer` trait the engine depends on
//! - `MemoryCache` over a sharded concurrent map
//! - `BlobCache` storing compressed binary snapshots
//!
//! Expiry is lazy: an expired entry reads as a miss and is purged on that read.

pub mod blob;
pub mod codec;
pub mod memory;

pub use blob::BlobCache;
pub use codec::SnapshotCodec;
pub use memory::MemoryCache;

use crate::core::Timestamp;
use crate::kpi::{KpiParams, MetricSnapshot};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cache key: KPI id plus the hash of its normalized parameters.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub kpi_id: String,
    pub param_hash: String,
}

impl CacheKey {
    /// Key for a KPI computed with `params`.
    pub fn new(kpi_id: &str, params: &KpiParams) -> Self {
        Self {
            kpi_id: kpi_id.to_string(),
            param_hash: params.param_hash(),
        }
    }

    /// Parse the `kpi_id:param_hash` rendering.
    pub fn parse(s: &str) -> Option<Self> {
        let (kpi_id, param_hash) = s.rsplit_once(':')?;
        if kpi_id.is_empty() || param_hash.is_empty() {
            return None;
        }
        Some(Self {
            kpi_id: kpi_id.to_string(),
            param_hash: param_hash.to_string(),
        })
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kpi_id, self.param_hash)
    }
}

/// A cached snapshot with its expiry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub value: MetricSnapshot,
    pub expires_at: Timestamp,
}

impl CacheEntry {
    /// Entry expiring `ttl` after `now`.
    pub fn new(key: CacheKey, value: MetricSnapshot, now: Timestamp, ttl: Duration) -> Self {
        Self {
            key,
            value,
            expires_at: expiry(now, ttl),
        }
    }

    /// Whether the entry is stale at `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }
}

/// `now + ttl`, saturating at the largest representable time.
pub fn expiry(now: Timestamp, ttl: Duration) -> Timestamp {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC)
}

/// Snapshot cache with per-entry TTL.
///
/// Operations on the same key are serialized; different keys do not contend.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    /// Live snapshot for `key`, or `None` on miss or expiry.
    async fn get(&self, key: &CacheKey) -> Option<MetricSnapshot>;

    /// Store a snapshot, replacing any entry and resetting its expiry.
    async fn set(&self, key: CacheKey, snapshot: MetricSnapshot, ttl: Duration);

    /// Drop one entry. Returns whether an entry existed.
    async fn invalidate(&self, key: &CacheKey) -> bool;

    /// Drop every parameter variant of a KPI. Returns how many were dropped.
    async fn invalidate_kpi(&self, kpi_id: &str) -> usize;

    /// Drop all expired entries. Returns how many were dropped.
    async fn purge_expired(&self) -> usize;

    /// Stored entries, including expired ones not yet purged.
    fn len(&self) -> usize;

    /// Whether nothing is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Backend name for logs and metrics.
    fn backend(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_cache_key_display_and_parse() {
        let key = CacheKey {
            kpi_id: "close_rate".to_string(),
            param_hash: "ab12".to_string(),
        };
        assert_eq!(key.to_string(), "close_rate:ab12");
        assert_eq!(CacheKey::parse("close_rate:ab12"), Some(key));
        assert_eq!(CacheKey::parse("no-separator"), None);
    }

    #[test]
    fn test_expiry_saturates() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            expiry(now, Duration::from_secs(30)),
            now + chrono::Duration::seconds(30)
        );
        assert_eq!(
            expiry(now, Duration::from_secs(u64::MAX)),
            chrono::DateTime::<Utc>::MAX_UTC
        );
    }
}
