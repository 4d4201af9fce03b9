//! Business alert records.

use crate::core::Timestamp;
use serde::{Deserialize, Serialize};

/// Alert severity level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    /// Informational
    Info,
    /// Warning
    Warning,
    /// Critical
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Info => write!(f, "info"),
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// A KPI crossing its target in the unfavorable direction.
///
/// Alerts are kept for audit. Once `resolved` is set it never clears.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BusinessAlert {
    /// Alert ID (UUID v4)
    pub id: String,
    /// KPI that crossed its target
    pub kpi_id: String,
    /// Severity
    pub severity: AlertSeverity,
    /// When the alert was raised
    pub triggered_at: Timestamp,
    /// Human-readable summary
    pub message: String,
    /// Whether the KPI returned to band
    pub resolved: bool,
    /// When it was resolved
    pub resolved_at: Option<Timestamp>,
    /// Value that raised the alert
    pub value: f64,
    /// Target at the time
    pub target: f64,
    /// Relative distance past target
    pub deviation: f64,
}

impl BusinessAlert {
    /// Raise a new open alert.
    pub fn new(
        kpi_id: &str,
        severity: AlertSeverity,
        value: f64,
        target: f64,
        deviation: f64,
        message: String,
        triggered_at: Timestamp,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kpi_id: kpi_id.to_string(),
            severity,
            triggered_at,
            message,
            resolved: false,
            resolved_at: None,
            value,
            target,
            deviation,
        }
    }

    /// Mark resolved. Returns false if it already was.
    pub fn resolve(&mut self, at: Timestamp) -> bool {
        if self.resolved {
            return false;
        }
        self.resolved = true;
        self.resolved_at = Some(at);
        true
    }

    /// Raise the severity of an open alert. Lower severities are ignored.
    pub fn escalate(&mut self, severity: AlertSeverity, value: f64, deviation: f64) -> bool {
        if self.resolved || severity <= self.severity {
            return false;
        }
        self.severity = severity;
        self.value = value;
        self.deviation = deviation;
        true
    }

    /// Whether the alert is still open.
    pub fn is_open(&self) -> bool {
        !self.resolved
    }
}

/// A change in an alert's lifecycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transition", rename_all = "snake_case")]
pub enum AlertTransition {
    /// A new alert was opened
    Raised { alert: BusinessAlert },
    /// An open alert moved to a higher severity
    Escalated {
        alert: BusinessAlert,
        previous: AlertSeverity,
    },
    /// An open alert returned to band
    Resolved { alert: BusinessAlert },
}

impl AlertTransition {
    /// The alert after the transition.
    pub fn alert(&self) -> &BusinessAlert {
        match self {
            AlertTransition::Raised { alert }
            | AlertTransition::Escalated { alert, .. }
            | AlertTransition::Resolved { alert } => alert,
        }
    }
}
