//! Binary snapshot encoding.
//!
//! Layout: LZ4 block (size-prepended) of the bincode encoding of
//! `(version, snapshot, expires_at)`.

use crate::core::{Error, Result, Timestamp};
use crate::kpi::MetricSnapshot;
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use serde::{Deserialize, Serialize};

/// Current blob layout version.
pub const CODEC_VERSION: u8 = 1;

#[derive(Serialize, Deserialize)]
struct StoredSnapshot {
    version: u8,
    snapshot: MetricSnapshot,
    expires_at: Timestamp,
}

/// Encodes snapshots for byte-oriented cache backends.
#[derive(Clone, Copy, Debug, Default)]
pub struct SnapshotCodec;

impl SnapshotCodec {
    /// Encode a snapshot together with its expiry.
    pub fn encode(snapshot: &MetricSnapshot, expires_at: Timestamp) -> Result<Vec<u8>> {
        let stored = StoredSnapshot {
            version: CODEC_VERSION,
            snapshot: snapshot.clone(),
            expires_at,
        };
        let raw = bincode::serialize(&stored)?;
        Ok(compress_prepend_size(&raw))
    }

    /// Decode a blob produced by [`SnapshotCodec::encode`].
    pub fn decode(bytes: &[u8]) -> Result<(MetricSnapshot, Timestamp)> {
        let raw = decompress_size_prepended(bytes)
            .map_err(|e| Error::Serialization(format!("snapshot decompression failed: {}", e)))?;
        let stored: StoredSnapshot = bincode::deserialize(&raw)?;
        if stored.version != CODEC_VERSION {
            return Err(Error::Serialization(format!(
                "unsupported snapshot blob version {}",
                stored.version
            )));
        }
        Ok((stored.snapshot, stored.expires_at))
    }
}
