//! Metric Source Module
//!
//! Read-only access to the aggregates KPIs are computed from:
//! - `MetricSource` trait the engine depends on
//! - `RecordSource` over in-memory CRM records (leads, projects, appointments)
//! - `StaticSource` with fixed values, for tests and benchmarks

pub mod records;
pub mod static_source;

pub use records::{Appointment, BusinessRecords, Lead, Project, RecordSource};
pub use static_source::StaticSource;

use crate::core::{Result, TimeWindow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An aggregate the source can answer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMetric {
    /// Leads created in the window
    LeadsCreated,
    /// Leads first contacted in the window
    LeadsContacted,
    /// Leads converted to a signed project in the window
    LeadsConverted,
    /// Estimated value of leads created in the window and still open at its end
    PipelineValue,
    /// Contract value recognized as revenue in the window
    RevenueRecognized,
    /// Projects started in the window
    ProjectsStarted,
    /// Projects completed in the window
    ProjectsCompleted,
    /// Appointments booked in the window
    AppointmentsScheduled,
    /// Appointments held in the window
    AppointmentsCompleted,
    /// Sum of first-response minutes for leads created in the window
    ResponseMinutesTotal,
    /// Number of leads created in the window that received a response
    ResponsesRecorded,
    /// Source-specific aggregate
    Custom(String),
}

impl std::fmt::Display for SourceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceMetric::LeadsCreated => write!(f, "leads_created"),
            SourceMetric::LeadsContacted => write!(f, "leads_contacted"),
            SourceMetric::LeadsConverted => write!(f, "leads_converted"),
            SourceMetric::PipelineValue => write!(f, "pipeline_value"),
            SourceMetric::RevenueRecognized => write!(f, "revenue_recognized"),
            SourceMetric::ProjectsStarted => write!(f, "projects_started"),
            SourceMetric::ProjectsCompleted => write!(f, "projects_completed"),
            SourceMetric::AppointmentsScheduled => write!(f, "appointments_scheduled"),
            SourceMetric::AppointmentsCompleted => write!(f, "appointments_completed"),
            SourceMetric::ResponseMinutesTotal => write!(f, "response_minutes_total"),
            SourceMetric::ResponsesRecorded => write!(f, "responses_recorded"),
            SourceMetric::Custom(name) => write!(f, "custom:{}", name),
        }
    }
}

/// One aggregate request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregateQuery {
    /// What to aggregate
    pub metric: SourceMetric,
    /// Over which window
    pub window: TimeWindow,
    /// Record filters
    pub filters: BTreeMap<String, String>,
}

impl AggregateQuery {
    /// Create an unfiltered query.
    pub fn new(metric: SourceMetric, window: TimeWindow) -> Self {
        Self {
            metric,
            window,
            filters: BTreeMap::new(),
        }
    }

    /// Replace filters.
    pub fn with_filters(mut self, filters: BTreeMap<String, String>) -> Self {
        self.filters = filters;
        self
    }
}

/// Read-only provider of business aggregates.
///
/// The engine never mutates the source. Failures to reach the underlying
/// records are reported as `Error::SourceUnavailable`.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Answer one aggregate query.
    async fn fetch(&self, query: &AggregateQuery) -> Result<f64>;

    /// Source name for logs.
    fn name(&self) -> &str;

    /// Health check for the source.
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_display() {
        assert_eq!(SourceMetric::LeadsCreated.to_string(), "leads_created");
        assert_eq!(
            SourceMetric::Custom("roof_inspections".to_string()).to_string(),
            "custom:roof_inspections"
        );
    }

    #[test]
    fn test_metric_serde_names() {
        let json = serde_json::to_string(&SourceMetric::RevenueRecognized).unwrap();
        assert_eq!(json, "\"revenue_recognized\"");

        let parsed: SourceMetric = serde_json::from_str("\"appointments_completed\"").unwrap();
        assert_eq!(parsed, SourceMetric::AppointmentsCompleted);
    }
}
