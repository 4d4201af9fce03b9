//! KPI definitions.
//!
//! A definition names a KPI, says how to compute it, what the target is and
//! how long a computed value stays fresh.

use crate::alerts::AlertPolicy;
use crate::core::{Error, Result};
use crate::kpi::formula::{FormulaCatalog, FormulaSpec, Formula};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Unit a KPI value is expressed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiUnit {
    /// Money (USD)
    Currency,
    /// 0..=100
    Percent,
    /// Plain count
    Count,
    /// Elapsed time (minutes)
    Duration,
}

impl std::fmt::Display for KpiUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KpiUnit::Currency => write!(f, "currency"),
            KpiUnit::Percent => write!(f, "percent"),
            KpiUnit::Count => write!(f, "count"),
            KpiUnit::Duration => write!(f, "duration"),
        }
    }
}

/// Which side of the target is favorable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Values above target are good (revenue, close rate).
    #[default]
    HigherIsBetter,
    /// Values below target are good (response time, cancellations).
    LowerIsBetter,
}

/// An immutable KPI definition.
#[derive(Clone, Debug, PartialEq)]
pub struct KpiDefinition {
    /// Unique identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// How the value is aggregated from the metric source
    pub formula: Formula,
    /// Target value
    pub target: f64,
    /// How long a computed value may be served from cache
    pub ttl: Duration,
    /// Unit of the value
    pub unit: KpiUnit,
    /// Favorable direction relative to the target
    pub direction: Direction,
    /// Alert bands; `None` uses the evaluator default
    pub alert_policy: Option<AlertPolicy>,
}

impl KpiDefinition {
    /// Create a definition with a higher-is-better direction and default alert policy.
    pub fn new(id: &str, formula: Formula, target: f64, ttl: Duration, unit: KpiUnit) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            formula,
            target,
            ttl,
            unit,
            direction: Direction::HigherIsBetter,
            alert_policy: None,
        }
    }

    /// Set display name.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Set direction.
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Set a per-KPI alert policy.
    pub fn with_alert_policy(mut self, policy: AlertPolicy) -> Self {
        self.alert_policy = Some(policy);
        self
    }

    /// Check the definition is usable with the given TTL ceiling.
    pub fn validate(&self, max_ttl: Duration) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidConfig("KPI id must not be empty".to_string()));
        }
        if !self.target.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "KPI {} has a non-finite target",
                self.id
            )));
        }
        if self.ttl.is_zero() || self.ttl > max_ttl {
            return Err(Error::InvalidConfig(format!(
                "KPI {} ttl {:?} must be within (0, {:?}]",
                self.id, self.ttl, max_ttl
            )));
        }
        if let Some(policy) = &self.alert_policy {
            policy
                .validate()
                .map_err(|e| Error::InvalidConfig(format!("KPI {}: {}", self.id, e)))?;
        }
        Ok(())
    }
}

/// Serialized form of a KPI definition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KpiConfig {
    /// Unique identifier
    pub id: String,
    /// Display name (defaults to the id)
    #[serde(default)]
    pub name: Option<String>,
    /// Formula
    pub formula: FormulaSpec,
    /// Target value
    pub target: f64,
    /// Cache TTL in seconds
    pub ttl_secs: u64,
    /// Unit
    pub unit: KpiUnit,
    /// Favorable direction
    #[serde(default)]
    pub direction: Direction,
    /// Per-KPI alert bands
    #[serde(default)]
    pub alert_policy: Option<AlertPolicy>,
}

impl KpiConfig {
    /// Build the definition, resolving custom formulas through `catalog`.
    pub fn to_definition(&self, catalog: &FormulaCatalog) -> Result<KpiDefinition> {
        Ok(KpiDefinition {
            id: self.id.clone(),
            name: self.name.clone().unwrap_or_else(|| self.id.clone()),
            formula: self.formula.build(catalog)?,
            target: self.target,
            ttl: Duration::from_secs(self.ttl_secs),
            unit: self.unit,
            direction: self.direction,
            alert_policy: self.alert_policy.clone(),
        })
    }
}
