//! Engine configuration.
//!
//! Loaded once at startup from JSON. A changed configuration is applied by
//! building a new registry and engine from it.

use crate::alerts::AlertPolicy;
use crate::core::{Error, Result};
use crate::dashboard::RoleProfile;
use crate::kpi::KpiConfig;
use crate::monitoring::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// KPI definitions, in dashboard order
    pub kpis: Vec<KpiConfig>,
    /// Role dashboards
    pub roles: Vec<RoleProfile>,
    /// Cache settings
    pub cache: CacheConfig,
    /// Default alert bands
    pub alerts: AlertPolicy,
    /// Background refresh
    pub refresh: RefreshConfig,
    /// Logging
    pub logging: LoggingConfig,
}

/// Cache settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Longest TTL a KPI may declare
    pub max_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_ttl_secs: 3600 }
    }
}

/// Background refresh settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Start the scheduler
    pub enabled: bool,
    /// Length of the trailing window refreshed, in days
    pub window_days: u32,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            window_days: 30,
        }
    }
}

impl AnalyticsConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Structural checks that do not need the formula catalog.
    ///
    /// Duplicate KPI ids are left to the registry, which reports them as
    /// `DuplicateKpi`.
    pub fn validate(&self) -> Result<()> {
        if self.cache.max_ttl_secs == 0 {
            return Err(Error::InvalidConfig(
                "cache.max_ttl_secs must be positive".to_string(),
            ));
        }
        if self.refresh.window_days == 0 {
            return Err(Error::InvalidConfig(
                "refresh.window_days must be positive".to_string(),
            ));
        }
        self.alerts
            .validate()
            .map_err(|e| Error::InvalidConfig(format!("alerts: {}", e)))?;
        self.logging.level()?;

        let kpi_ids: HashSet<&str> = self.kpis.iter().map(|k| k.id.as_str()).collect();
        let mut roles = HashSet::new();
        for profile in &self.roles {
            if !roles.insert(profile.role.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "role defined twice: {}",
                    profile.role
                )));
            }
            if let Some(missing) = profile.kpi_ids.iter().find(|id| !kpi_ids.contains(id.as_str())) {
                return Err(Error::InvalidConfig(format!(
                    "role {} references unknown KPI {}",
                    profile.role, missing
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "kpis": [
            {"id": "response_time_minutes", "name": "Lead Response Time",
             "formula": {"kind": "average", "total": "response_minutes_total", "count": "responses_recorded"},
             "target": 2.0, "ttl_secs": 60, "unit": "duration", "direction": "lower_is_better"}
        ],
        "roles": [
            {"role": "sales_manager", "kpi_ids": ["response_time_minutes"]}
        ],
        "refresh": {"enabled": true}
    }"#;

    #[test]
    fn test_defaults() {
        let config = AnalyticsConfig::from_json_str("{}").unwrap();
        assert!(config.kpis.is_empty());
        assert_eq!(config.cache.max_ttl_secs, 3600);
        assert_eq!(config.alerts, AlertPolicy::default());
        assert!(!config.refresh.enabled);
        assert_eq!(config.refresh.window_days, 30);
    }

    #[test]
    fn test_parse() {
        let config = AnalyticsConfig::from_json_str(CONFIG).unwrap();
        assert_eq!(config.kpis.len(), 1);
        assert_eq!(config.roles[0].role, "sales_manager");
        assert!(config.refresh.enabled);
        assert_eq!(config.refresh.window_days, 30);
    }

    #[test]
    fn test_unknown_role_kpi() {
        let err = AnalyticsConfig::from_json_str(
            r#"{"roles": [{"role": "owner", "kpi_ids": ["monthly_revenue"]}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_bad_alert_bands() {
        let err = AnalyticsConfig::from_json_str(
            r#"{"alerts": {"tolerance": 0.5, "warning_band": 0.2, "critical_band": 0.3}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_malformed_json() {
        let err = AnalyticsConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = AnalyticsConfig::from_file("/nonexistent/analytics.json").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
