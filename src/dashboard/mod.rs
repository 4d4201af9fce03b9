//! Dashboard Module
//!
//! Assembles role dashboards from KPI snapshots. A KPI that fails to compute
//! becomes a placeholder widget; the rest of the dashboard is still served.

use crate::core::config::AnalyticsConfig;
use crate::core::{Error, Result, Timestamp};
use crate::engine::AnalyticsEngine;
use crate::kpi::{KpiParams, MetricSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// KPIs shown to a role, in display order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleProfile {
    /// Role name (`owner`, `sales_manager`, `sales_rep`, ...)
    pub role: String,
    /// KPI ids, in display order
    pub kpi_ids: Vec<String>,
}

impl RoleProfile {
    /// Create a profile.
    pub fn new(role: &str, kpi_ids: &[&str]) -> Self {
        Self {
            role: role.to_string(),
            kpi_ids: kpi_ids.iter().map(|id| id.to_string()).collect(),
        }
    }
}

/// One dashboard tile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Widget {
    /// Computed value
    Ready { snapshot: MetricSnapshot },
    /// Placeholder for a KPI that could not be computed
    Failed {
        kpi_id: String,
        code: String,
        error: String,
    },
}

impl Widget {
    /// KPI the widget shows.
    pub fn kpi_id(&self) -> &str {
        match self {
            Widget::Ready { snapshot } => &snapshot.kpi_id,
            Widget::Failed { kpi_id, .. } => kpi_id,
        }
    }

    /// Whether the widget carries a value.
    pub fn is_ready(&self) -> bool {
        matches!(self, Widget::Ready { .. })
    }
}

/// An assembled dashboard.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DashboardPayload {
    pub role: String,
    pub generated_at: Timestamp,
    pub widgets: Vec<Widget>,
}

impl DashboardPayload {
    /// Widgets that failed.
    pub fn failures(&self) -> impl Iterator<Item = &Widget> {
        self.widgets.iter().filter(|w| !w.is_ready())
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Builds dashboards for configured roles.
pub struct DashboardAssembler {
    engine: AnalyticsEngine,
    roles: HashMap<String, RoleProfile>,
}

impl DashboardAssembler {
    /// Create an assembler with no roles.
    pub fn new(engine: AnalyticsEngine) -> Self {
        Self {
            engine,
            roles: HashMap::new(),
        }
    }

    /// Create an assembler with the configured roles.
    pub fn from_config(engine: AnalyticsEngine, config: &AnalyticsConfig) -> Result<Self> {
        let mut assembler = Self::new(engine);
        for profile in &config.roles {
            assembler.add_role(profile.clone())?;
        }
        Ok(assembler)
    }

    /// Add or replace a role. Every KPI it lists must be registered.
    pub fn add_role(&mut self, profile: RoleProfile) -> Result<()> {
        let registry = self.engine.registry();
        if let Some(missing) = profile.kpi_ids.iter().find(|id| !registry.contains(id)) {
            return Err(Error::KpiNotFound(missing.clone()));
        }
        self.roles.insert(profile.role.clone(), profile);
        Ok(())
    }

    /// Role profile.
    pub fn role(&self, role: &str) -> Option<&RoleProfile> {
        self.roles.get(role)
    }

    /// Configured role names, sorted.
    pub fn roles(&self) -> Vec<&str> {
        let mut roles: Vec<&str> = self.roles.keys().map(String::as_str).collect();
        roles.sort_unstable();
        roles
    }

    /// Compute every KPI of a role for the given parameters.
    pub async fn assemble(&self, role: &str, params: &KpiParams) -> Result<DashboardPayload> {
        let profile = self
            .roles
            .get(role)
            .ok_or_else(|| Error::RoleNotFound(role.to_string()))?;

        let widgets: Vec<Widget> = self
            .engine
            .compute_many(&profile.kpi_ids, params)
            .await
            .into_iter()
            .map(|(kpi_id, result)| match result {
                Ok(snapshot) => Widget::Ready { snapshot },
                Err(e) => {
                    tracing::warn!(role = %role, kpi = %kpi_id, error = %e, "dashboard widget failed");
                    Widget::Failed {
                        kpi_id,
                        code: e.code().to_string(),
                        error: e.to_string(),
                    }
                }
            })
            .collect();

        let failed = widgets.iter().filter(|w| !w.is_ready()).count();
        tracing::debug!(role = %role, widgets = widgets.len(), failed, "dashboard assembled");

        Ok(DashboardPayload {
            role: role.to_string(),
            generated_at: self.engine.now(),
            widgets,
        })
    }
}
