//! Computation parameters and their canonical hash.

use crate::core::{Error, Result, TimeWindow};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::collections::BTreeMap;

/// Parameters of one KPI computation: the aggregation window plus optional
/// record filters (`region`, `sales_rep`, `lead_source`, ...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KpiParams {
    /// Aggregation window
    pub window: TimeWindow,
    /// Record filters, keyed by lower-case field name
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
}

impl KpiParams {
    /// Parameters for a window with no filters.
    pub fn new(window: TimeWindow) -> Self {
        Self {
            window,
            filters: BTreeMap::new(),
        }
    }

    /// Add a filter. Keys are trimmed and lower-cased, values trimmed.
    pub fn with_filter(mut self, key: &str, value: &str) -> Self {
        self.filters
            .insert(key.trim().to_lowercase(), value.trim().to_string());
        self
    }

    /// Reject malformed windows and blank filters.
    pub fn validate(&self) -> Result<()> {
        self.window.validate()?;
        for (key, value) in &self.filters {
            if key.trim().is_empty() {
                return Err(Error::InvalidParameter("filter key must not be empty".to_string()));
            }
            if value.trim().is_empty() {
                return Err(Error::InvalidParameter(format!(
                    "filter {} has an empty value",
                    key
                )));
            }
        }
        Ok(())
    }

    /// Canonical form: trimmed lower-case keys, trimmed values.
    pub fn normalized(&self) -> Self {
        let filters = self
            .filters
            .iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
            .collect();
        Self {
            window: self.window,
            filters,
        }
    }

    /// Hex SHA3-256 of the normalized parameters.
    ///
    /// Fields are length-prefixed so no filter value can collide with
    /// another rendering.
    pub fn param_hash(&self) -> String {
        let normalized = self.normalized();
        let mut hasher = Sha3_256::new();
        hasher.update(normalized.window.start.timestamp_micros().to_be_bytes());
        hasher.update(normalized.window.end.timestamp_micros().to_be_bytes());
        for (key, value) in &normalized.filters {
            hasher.update((key.len() as u64).to_be_bytes());
            hasher.update(key.as_bytes());
            hasher.update((value.len() as u64).to_be_bytes());
            hasher.update(value.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}
