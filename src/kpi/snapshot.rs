//! Computed KPI values.

use crate::core::{Timestamp, TimeWindow};
use crate::kpi::definition::{KpiDefinition, KpiUnit};
use crate::kpi::params::KpiParams;
use serde::{Deserialize, Serialize};

/// An immutable, timestamped KPI value.
///
/// Snapshots are never updated; a recomputation produces a new snapshot
/// that supersedes the old one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    /// KPI this value belongs to
    pub kpi_id: String,
    /// Computed value
    pub value: f64,
    /// Unit of the value
    pub unit: KpiUnit,
    /// Target at computation time
    pub target: f64,
    /// When it was computed
    pub computed_at: Timestamp,
    /// Window the value aggregates
    pub source_window: TimeWindow,
    /// Hash of the parameters it was computed for
    pub param_hash: String,
}

impl MetricSnapshot {
    /// Wrap a freshly computed value.
    pub fn new(definition: &KpiDefinition, params: &KpiParams, value: f64, computed_at: Timestamp) -> Self {
        Self {
            kpi_id: definition.id.clone(),
            value,
            unit: definition.unit,
            target: definition.target,
            computed_at,
            source_window: params.window,
            param_hash: params.param_hash(),
        }
    }

    /// Seconds since computation, as of `now`.
    pub fn age_seconds(&self, now: Timestamp) -> i64 {
        (now - self.computed_at).num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kpi::formula::Formula;
    use crate::source::SourceMetric;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn test_snapshot_from_definition() {
        let at = Utc.with_ymd_and_hms(2024, 8, 1, 8, 0, 0).unwrap();
        let def = KpiDefinition::new(
            "projects_completed",
            Formula::Total(SourceMetric::ProjectsCompleted),
            40.0,
            std::time::Duration::from_secs(900),
            KpiUnit::Count,
        );
        let params = KpiParams::new(TimeWindow::trailing(at, Duration::days(30)).unwrap());

        let snapshot = MetricSnapshot::new(&def, &params, 37.0, at);
        assert_eq!(snapshot.kpi_id, "projects_completed");
        assert_eq!(snapshot.target, 40.0);
        assert_eq!(snapshot.source_window, params.window);
        assert_eq!(snapshot.param_hash, params.param_hash());
        assert_eq!(snapshot.age_seconds(at + Duration::seconds(90)), 90);
    }
}
