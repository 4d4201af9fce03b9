//! Metric source over CRM business records.
//!
//! Aggregates leads, projects and appointments held in memory. The CRM
//! replaces the record set as data changes; the engine only reads.

use crate::core::{Error, Result, Timestamp, TimeWindow};
use crate::source::{AggregateQuery, MetricSource, SourceMetric};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Filter keys understood by the record source.
pub const FILTER_KEYS: [&str; 3] = ["region", "sales_rep", "lead_source"];

/// A sales lead.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub created_at: Timestamp,
    /// First contact by a rep
    pub contacted_at: Option<Timestamp>,
    /// Minutes from creation to first response
    pub first_response_minutes: Option<f64>,
    /// When the lead signed
    pub converted_at: Option<Timestamp>,
    /// Estimated job value (USD)
    pub estimated_value: f64,
    pub lead_source: String,
    pub region: String,
    pub sales_rep: String,
}

/// A roofing project.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub lead_id: String,
    pub started_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    /// When the contract value was recognized as revenue
    pub revenue_recognized_at: Option<Timestamp>,
    /// Contract value (USD)
    pub contract_value: f64,
    pub region: String,
    pub sales_rep: String,
}

/// An inspection or sales appointment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    /// When it was booked
    pub created_at: Timestamp,
    /// When it takes place
    pub scheduled_for: Timestamp,
    pub completed: bool,
    pub region: String,
    pub sales_rep: String,
}

/// The record set a [`RecordSource`] reads.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BusinessRecords {
    pub leads: Vec<Lead>,
    pub projects: Vec<Project>,
    pub appointments: Vec<Appointment>,
}

/// Filter keys that apply to appointment aggregates. Appointments carry no
/// lead, so `lead_source` cannot be resolved for them.
const APPOINTMENT_FILTER_KEYS: [&str; 2] = ["region", "sales_rep"];

/// Field lookup shared by all record kinds.
trait Filterable {
    fn field<'a>(&'a self, key: &str, records: &'a BusinessRecords) -> Option<&'a str>;

    fn matches(&self, filters: &BTreeMap<String, String>, records: &BusinessRecords) -> bool {
        filters.iter().all(|(key, value)| {
            self.field(key, records)
                .is_some_and(|v| v.eq_ignore_ascii_case(value))
        })
    }
}

impl Filterable for Lead {
    fn field<'a>(&'a self, key: &str, _records: &'a BusinessRecords) -> Option<&'a str> {
        match key {
            "region" => Some(&self.region),
            "sales_rep" => Some(&self.sales_rep),
            "lead_source" => Some(&self.lead_source),
            _ => None,
        }
    }
}

impl Filterable for Project {
    fn field<'a>(&'a self, key: &str, records: &'a BusinessRecords) -> Option<&'a str> {
        match key {
            "region" => Some(&self.region),
            "sales_rep" => Some(&self.sales_rep),
            // Through the lead the project was sold from.
            "lead_source" => records
                .leads
                .iter()
                .find(|l| l.id == self.lead_id)
                .map(|l| l.lead_source.as_str()),
            _ => None,
        }
    }
}

impl Filterable for Appointment {
    fn field<'a>(&'a self, key: &str, _records: &'a BusinessRecords) -> Option<&'a str> {
        match key {
            "region" => Some(&self.region),
            "sales_rep" => Some(&self.sales_rep),
            _ => None,
        }
    }
}

fn in_window(ts: Option<Timestamp>, window: &TimeWindow) -> bool {
    ts.is_some_and(|t| window.contains(&t))
}

impl BusinessRecords {
    /// Evaluate one aggregate.
    pub fn aggregate(&self, query: &AggregateQuery) -> Result<f64> {
        let appointment_metric = matches!(
            query.metric,
            SourceMetric::AppointmentsScheduled | SourceMetric::AppointmentsCompleted
        );
        for key in query.filters.keys() {
            if !FILTER_KEYS.contains(&key.as_str()) {
                return Err(Error::InvalidParameter(format!("unknown filter: {}", key)));
            }
            if appointment_metric && !APPOINTMENT_FILTER_KEYS.contains(&key.as_str()) {
                return Err(Error::InvalidParameter(format!(
                    "filter {} does not apply to {}",
                    key, query.metric
                )));
            }
        }

        let window = &query.window;
        let filters = &query.filters;
        let leads = || self.leads.iter().filter(move |l| l.matches(filters, self));
        let projects = || self.projects.iter().filter(move |p| p.matches(filters, self));
        let appointments = || self.appointments.iter().filter(move |a| a.matches(filters, self));

        let value = match &query.metric {
            SourceMetric::LeadsCreated => {
                leads().filter(|l| window.contains(&l.created_at)).count() as f64
            }
            SourceMetric::LeadsContacted => {
                leads().filter(|l| in_window(l.contacted_at, window)).count() as f64
            }
            SourceMetric::LeadsConverted => {
                leads().filter(|l| in_window(l.converted_at, window)).count() as f64
            }
            SourceMetric::PipelineValue => leads()
                .filter(|l| window.contains(&l.created_at))
                .filter(|l| l.converted_at.map_or(true, |c| c >= window.end))
                .map(|l| l.estimated_value)
                .sum(),
            SourceMetric::RevenueRecognized => projects()
                .filter(|p| in_window(p.revenue_recognized_at, window))
                .map(|p| p.contract_value)
                .sum(),
            SourceMetric::ProjectsStarted => {
                projects().filter(|p| window.contains(&p.started_at)).count() as f64
            }
            SourceMetric::ProjectsCompleted => {
                projects().filter(|p| in_window(p.completed_at, window)).count() as f64
            }
            SourceMetric::AppointmentsScheduled => appointments()
                .filter(|a| window.contains(&a.created_at))
                .count() as f64,
            SourceMetric::AppointmentsCompleted => appointments()
                .filter(|a| a.completed && window.contains(&a.scheduled_for))
                .count() as f64,
            SourceMetric::ResponseMinutesTotal => leads()
                .filter(|l| window.contains(&l.created_at))
                .filter_map(|l| l.first_response_minutes)
                .sum(),
            SourceMetric::ResponsesRecorded => leads()
                .filter(|l| window.contains(&l.created_at))
                .filter(|l| l.first_response_minutes.is_some())
                .count() as f64,
            SourceMetric::Custom(name) => {
                return Err(Error::InvalidParameter(format!(
                    "record source has no aggregate named {}",
                    name
                )))
            }
        };
        Ok(value)
    }
}

/// Metric source over a shared record set.
#[derive(Debug, Default)]
pub struct RecordSource {
    records: RwLock<BusinessRecords>,
}

impl RecordSource {
    /// Create a source over the given records.
    pub fn new(records: BusinessRecords) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Swap in a new record set. Callers should invalidate affected KPIs.
    pub async fn replace(&self, records: BusinessRecords) {
        *self.records.write().await = records;
    }

    /// Current number of leads, projects and appointments.
    pub async fn counts(&self) -> (usize, usize, usize) {
        let records = self.records.read().await;
        (
            records.leads.len(),
            records.projects.len(),
            records.appointments.len(),
        )
    }
}

#[async_trait]
impl MetricSource for RecordSource {
    async fn fetch(&self, query: &AggregateQuery) -> Result<f64> {
        let records = self.records.read().await;
        records.aggregate(query)
    }

    fn name(&self) -> &str {
        "records"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn t(day: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
    }

    fn lead(id: &str, day: u32, region: &str, response: Option<f64>, converted: Option<u32>) -> Lead {
        Lead {
            id: id.to_string(),
            created_at: t(day),
            contacted_at: response.map(|_| t(day)),
            first_response_minutes: response,
            converted_at: converted.map(t),
            estimated_value: 12_000.0,
            lead_source: "website".to_string(),
            region: region.to_string(),
            sales_rep: "dana".to_string(),
        }
    }

    fn records() -> BusinessRecords {
        BusinessRecords {
            leads: vec![
                lead("l1", 2, "north", Some(1.0), Some(5)),
                lead("l2", 3, "north", Some(2.0), None),
                lead("l3", 4, "south", None, None),
                lead("l4", 20, "south", Some(4.0), None),
            ],
            projects: vec![Project {
                id: "p1".to_string(),
                lead_id: "l1".to_string(),
                started_at: t(6),
                completed_at: Some(t(9)),
                revenue_recognized_at: Some(t(9)),
                contract_value: 18_500.0,
                region: "north".to_string(),
                sales_rep: "dana".to_string(),
            }],
            appointments: vec![
                Appointment {
                    id: "a1".to_string(),
                    created_at: t(2),
                    scheduled_for: t(4),
                    completed: true,
                    region: "north".to_string(),
                    sales_rep: "dana".to_string(),
                },
                Appointment {
                    id: "a2".to_string(),
                    created_at: t(3),
                    scheduled_for: t(8),
                    completed: false,
                    region: "south".to_string(),
                    sales_rep: "lee".to_string(),
                },
            ],
        }
    }

    fn first_ten_days() -> TimeWindow {
        TimeWindow::new(t(1), t(1) + Duration::days(10)).unwrap()
    }

    #[tokio::test]
    async fn test_lead_aggregates() {
        let source = RecordSource::new(records());
        let window = first_ten_days();

        let created = source
            .fetch(&AggregateQuery::new(SourceMetric::LeadsCreated, window))
            .await
            .unwrap();
        let converted = source
            .fetch(&AggregateQuery::new(SourceMetric::LeadsConverted, window))
            .await
            .unwrap();
        let minutes = source
            .fetch(&AggregateQuery::new(SourceMetric::ResponseMinutesTotal, window))
            .await
            .unwrap();
        let responses = source
            .fetch(&AggregateQuery::new(SourceMetric::ResponsesRecorded, window))
            .await
            .unwrap();

        assert_eq!(created, 3.0);
        assert_eq!(converted, 1.0);
        assert_eq!(minutes, 3.0);
        assert_eq!(responses, 2.0);
    }

    #[tokio::test]
    async fn test_pipeline_excludes_converted_leads() {
        let source = RecordSource::new(records());
        let pipeline = source
            .fetch(&AggregateQuery::new(SourceMetric::PipelineValue, first_ten_days()))
            .await
            .unwrap();
        assert_eq!(pipeline, 24_000.0);
    }

    #[tokio::test]
    async fn test_project_and_appointment_aggregates() {
        let records = records();
        let window = first_ten_days();

        let revenue = records
            .aggregate(&AggregateQuery::new(SourceMetric::RevenueRecognized, window))
            .unwrap();
        let completed = records
            .aggregate(&AggregateQuery::new(SourceMetric::AppointmentsCompleted, window))
            .unwrap();
        let scheduled = records
            .aggregate(&AggregateQuery::new(SourceMetric::AppointmentsScheduled, window))
            .unwrap();

        assert_eq!(revenue, 18_500.0);
        assert_eq!(completed, 1.0);
        assert_eq!(scheduled, 2.0);
    }

    #[tokio::test]
    async fn test_filters() {
        let records = records();
        let mut filters = BTreeMap::new();
        filters.insert("region".to_string(), "North".to_string());

        let created = records
            .aggregate(
                &AggregateQuery::new(SourceMetric::LeadsCreated, first_ten_days())
                    .with_filters(filters),
            )
            .unwrap();
        assert_eq!(created, 2.0);

        let mut unknown = BTreeMap::new();
        unknown.insert("zip".to_string(), "60601".to_string());
        let err = records
            .aggregate(
                &AggregateQuery::new(SourceMetric::LeadsCreated, first_ten_days())
                    .with_filters(unknown),
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn test_replace_records() {
        let source = RecordSource::new(BusinessRecords::default());
        assert_eq!(source.counts().await, (0, 0, 0));

        source.replace(records()).await;
        assert_eq!(source.counts().await, (4, 1, 2));
    }

    #[test]
    fn test_lead_source_filter_on_projects() {
        let records = records();
        let by_source = |source: &str, metric: SourceMetric| {
            let mut filters = BTreeMap::new();
            filters.insert("lead_source".to_string(), source.to_string());
            records.aggregate(&AggregateQuery::new(metric, first_ten_days()).with_filters(filters))
        };

        assert_eq!(by_source("website", SourceMetric::RevenueRecognized).unwrap(), 18_500.0);
        assert_eq!(by_source("Website", SourceMetric::ProjectsStarted).unwrap(), 1.0);
        assert_eq!(by_source("referral", SourceMetric::RevenueRecognized).unwrap(), 0.0);

        let err = by_source("website", SourceMetric::AppointmentsScheduled).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }
}
