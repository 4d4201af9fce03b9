//! Fixed-value metric source.
//!
//! Answers every query for a metric with the value last set for it,
//! regardless of window or filters, and counts how often it was asked.

use crate::core::{Error, Result};
use crate::source::{AggregateQuery, MetricSource, SourceMetric};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

/// Metric source with settable values.
#[derive(Debug)]
pub struct StaticSource {
    /// Value per metric; unset metrics read as 0
    values: RwLock<HashMap<SourceMetric, f64>>,
    /// When false every fetch fails
    available: AtomicBool,
    /// Fetches served (including failed ones)
    calls: AtomicUsize,
    /// Simulated query latency
    latency: Option<Duration>,
}

impl StaticSource {
    /// Create an empty, available source.
    pub fn new() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
            latency: None,
        }
    }

    /// Set a value at construction.
    pub fn with_value(self, metric: SourceMetric, value: f64) -> Self {
        self.set_value(metric, value);
        self
    }

    /// Delay every fetch.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Change the value returned for a metric.
    pub fn set_value(&self, metric: SourceMetric, value: f64) {
        self.values
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(metric, value);
    }

    /// Toggle availability.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of fetches so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for StaticSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricSource for StaticSource {
    async fn fetch(&self, query: &AggregateQuery) -> Result<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if !self.available.load(Ordering::SeqCst) {
            return Err(Error::SourceUnavailable(format!(
                "static source offline while fetching {}",
                query.metric
            )));
        }

        let values = self
            .values
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(values.get(&query.metric).copied().unwrap_or(0.0))
    }

    fn name(&self) -> &str {
        "static"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.available.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{now, TimeWindow};
    use chrono::Duration as ChronoDuration;

    fn query(metric: SourceMetric) -> AggregateQuery {
        AggregateQuery::new(metric, TimeWindow::trailing(now(), ChronoDuration::days(1)).unwrap())
    }

    #[tokio::test]
    async fn test_values_and_call_count() {
        let source = StaticSource::new().with_value(SourceMetric::LeadsCreated, 42.0);

        assert_eq!(source.fetch(&query(SourceMetric::LeadsCreated)).await.unwrap(), 42.0);
        assert_eq!(source.fetch(&query(SourceMetric::ProjectsCompleted)).await.unwrap(), 0.0);
        assert_eq!(source.calls(), 2);

        source.set_value(SourceMetric::LeadsCreated, 7.0);
        assert_eq!(source.fetch(&query(SourceMetric::LeadsCreated)).await.unwrap(), 7.0);
    }

    #[tokio::test]
    async fn test_unavailable() {
        let source = StaticSource::new();
        source.set_available(false);

        let err = source.fetch(&query(SourceMetric::LeadsCreated)).await.unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable(_)));
        assert!(!source.health_check().await.unwrap());
    }
}
