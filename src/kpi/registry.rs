//! KPI registry.
//!
//! Populated once at startup and shared read-only afterwards. A new
//! configuration means a new registry.

use crate::core::config::AnalyticsConfig;
use crate::core::{Error, Result};
use crate::kpi::definition::KpiDefinition;
use crate::kpi::formula::FormulaCatalog;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Default TTL ceiling: one hour.
pub const DEFAULT_MAX_TTL: Duration = Duration::from_secs(3600);

/// Holds KPI definitions by id.
#[derive(Debug)]
pub struct KpiRegistry {
    /// Definitions by id
    definitions: HashMap<String, Arc<KpiDefinition>>,
    /// Registration order
    order: Vec<String>,
    /// Longest TTL accepted
    max_ttl: Duration,
}

impl KpiRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::with_max_ttl(DEFAULT_MAX_TTL)
    }

    /// Create an empty registry with a custom TTL ceiling.
    pub fn with_max_ttl(max_ttl: Duration) -> Self {
        Self {
            definitions: HashMap::new(),
            order: Vec::new(),
            max_ttl,
        }
    }

    /// Build a registry from configuration.
    pub fn from_config(config: &AnalyticsConfig, catalog: &FormulaCatalog) -> Result<Self> {
        let mut registry = Self::with_max_ttl(Duration::from_secs(config.cache.max_ttl_secs));
        for kpi in &config.kpis {
            registry.register(kpi.to_definition(catalog)?)?;
        }
        tracing::info!(kpis = registry.len(), "KPI registry loaded");
        Ok(registry)
    }

    /// Register a definition.
    pub fn register(&mut self, definition: KpiDefinition) -> Result<()> {
        if self.definitions.contains_key(&definition.id) {
            return Err(Error::DuplicateKpi(definition.id));
        }
        definition.validate(self.max_ttl)?;

        let id = definition.id.clone();
        self.definitions.insert(id.clone(), Arc::new(definition));
        self.order.push(id);
        Ok(())
    }

    /// Look up a definition.
    pub fn get(&self, id: &str) -> Result<Arc<KpiDefinition>> {
        self.definitions
            .get(id)
            .cloned()
            .ok_or_else(|| Error::KpiNotFound(id.to_string()))
    }

    /// Whether an id is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.definitions.contains_key(id)
    }

    /// Ids in registration order.
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    /// Definitions in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<KpiDefinition>> {
        self.order.iter().filter_map(|id| self.definitions.get(id))
    }

    /// Number of definitions.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for KpiRegistry {
    fn default() -> Self {
        Self::new()
    }
}
