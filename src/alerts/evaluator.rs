//! Alert evaluation.
//!
//! Compares snapshots with their KPI targets and keeps at most one open
//! alert per KPI.

use crate::alerts::alert::{AlertSeverity, AlertTransition, BusinessAlert};
use crate::alerts::policy::{deviation, AlertPolicy};
use crate::core::clock::{Clock, SystemClock};
use crate::core::config::AnalyticsConfig;
use crate::kpi::{KpiDefinition, MetricSnapshot};
use crate::notify::AnalyticsSink;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Alert state: every alert ever raised, plus the open one per KPI.
#[derive(Default)]
struct AlertBook {
    /// All alerts, oldest first
    history: Vec<BusinessAlert>,
    /// Open alert per KPI, as an index into `history`
    open: HashMap<String, usize>,
}

/// Evaluates snapshots against KPI targets.
pub struct AlertEvaluator {
    /// Bands for KPIs without their own policy
    default_policy: AlertPolicy,
    /// Alert state
    book: RwLock<AlertBook>,
    /// Time source for alert timestamps
    clock: Arc<dyn Clock>,
    /// Where transitions are reported
    sink: Option<Arc<dyn AnalyticsSink>>,
}

impl AlertEvaluator {
    /// Create an evaluator with the given default policy.
    pub fn new(default_policy: AlertPolicy) -> Self {
        Self {
            default_policy,
            book: RwLock::new(AlertBook::default()),
            clock: Arc::new(SystemClock),
            sink: None,
        }
    }

    /// Create an evaluator with the configured default policy.
    pub fn from_config(config: &AnalyticsConfig) -> Self {
        Self::new(config.alerts.clone())
    }

    /// Use a custom clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Report transitions to a sink.
    pub fn with_sink(mut self, sink: Arc<dyn AnalyticsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Evaluate a snapshot against its definition.
    ///
    /// Returns the alert when a new one is raised. An out-of-band value for a
    /// KPI that already has an open alert never raises a second one (it may
    /// escalate the open one); an in-band value resolves the open alert.
    pub fn evaluate(&self, snapshot: &MetricSnapshot, definition: &KpiDefinition) -> Option<BusinessAlert> {
        if snapshot.kpi_id != definition.id {
            tracing::warn!(
                snapshot_kpi = %snapshot.kpi_id,
                definition_kpi = %definition.id,
                "snapshot evaluated against another KPI's definition"
            );
            return None;
        }

        let dev = deviation(snapshot.value, definition.target, definition.direction);
        if !dev.is_finite() {
            tracing::warn!(kpi = %definition.id, value = snapshot.value, "skipping alert evaluation of non-finite value");
            return None;
        }

        let policy = definition.alert_policy.as_ref().unwrap_or(&self.default_policy);
        let severity = policy.classify(dev);
        let now = self.clock.now();

        let (raised, transition) = {
            let mut book = self.book.write().unwrap_or_else(PoisonError::into_inner);
            let open = book.open.get(&definition.id).copied();

            match (severity, open) {
                (None, None) => (None, None),
                (None, Some(idx)) => {
                    book.open.remove(&definition.id);
                    let alert = &mut book.history[idx];
                    alert.resolve(now);
                    (None, Some(AlertTransition::Resolved { alert: alert.clone() }))
                }
                (Some(severity), None) => {
                    let alert = BusinessAlert::new(
                        &definition.id,
                        severity,
                        snapshot.value,
                        definition.target,
                        dev,
                        describe(definition, snapshot.value, dev, severity),
                        now,
                    );
                    book.history.push(alert.clone());
                    let idx = book.history.len() - 1;
                    book.open.insert(definition.id.clone(), idx);
                    (
                        Some(alert.clone()),
                        Some(AlertTransition::Raised { alert }),
                    )
                }
                (Some(severity), Some(idx)) => {
                    let alert = &mut book.history[idx];
                    let previous = alert.severity;
                    if alert.escalate(severity, snapshot.value, dev) {
                        alert.message = describe(definition, snapshot.value, dev, severity);
                        (
                            None,
                            Some(AlertTransition::Escalated {
                                alert: alert.clone(),
                                previous,
                            }),
                        )
                    } else {
                        (None, None)
                    }
                }
            }
        };

        if let Some(transition) = &transition {
            let alert = transition.alert();
            match transition {
                AlertTransition::Raised { .. } => tracing::warn!(
                    kpi = %alert.kpi_id,
                    alert_id = %alert.id,
                    severity = %alert.severity,
                    value = alert.value,
                    "KPI alert raised"
                ),
                AlertTransition::Escalated { previous, .. } => tracing::warn!(
                    kpi = %alert.kpi_id,
                    alert_id = %alert.id,
                    from = %previous,
                    to = %alert.severity,
                    "KPI alert escalated"
                ),
                AlertTransition::Resolved { .. } => tracing::info!(
                    kpi = %alert.kpi_id,
                    alert_id = %alert.id,
                    value = snapshot.value,
                    "KPI alert resolved"
                ),
            }
            if let Some(sink) = &self.sink {
                sink.alert_transition(transition);
            }
        }

        raised
    }

    /// Open alert for a KPI.
    pub fn open_alert(&self, kpi_id: &str) -> Option<BusinessAlert> {
        let book = self.book.read().unwrap_or_else(PoisonError::into_inner);
        book.open.get(kpi_id).map(|idx| book.history[*idx].clone())
    }

    /// All open alerts, most severe first.
    pub fn open_alerts(&self) -> Vec<BusinessAlert> {
        let book = self.book.read().unwrap_or_else(PoisonError::into_inner);
        let mut alerts: Vec<BusinessAlert> =
            book.open.values().map(|idx| book.history[*idx].clone()).collect();
        alerts.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.triggered_at.cmp(&b.triggered_at))
        });
        alerts
    }

    /// Every alert ever raised, oldest first.
    pub fn history(&self) -> Vec<BusinessAlert> {
        self.book
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .clone()
    }

    /// Alerts ever raised for one KPI.
    pub fn history_for(&self, kpi_id: &str) -> Vec<BusinessAlert> {
        self.book
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .iter()
            .filter(|a| a.kpi_id == kpi_id)
            .cloned()
            .collect()
    }

    /// Default policy.
    pub fn default_policy(&self) -> &AlertPolicy {
        &self.default_policy
    }
}

impl Default for AlertEvaluator {
    fn default() -> Self {
        Self::new(AlertPolicy::default())
    }
}

fn describe(definition: &KpiDefinition, value: f64, dev: f64, severity: AlertSeverity) -> String {
    format!(
        "{} {}: {:.2} {} vs target {:.2} ({:.0}% past target)",
        severity,
        definition.name,
        value,
        definition.unit,
        definition.target,
        dev * 100.0
    )
}
