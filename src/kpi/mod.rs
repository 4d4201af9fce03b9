//! KPI Module
//!
//! Provides KPI definitions and their registry:
//! - Definitions with targets, units and TTLs
//! - Built-in and pluggable formulas
//! - Computation parameters and cache-key hashing
//! - Immutable computed snapshots

pub mod definition;
pub mod formula;
pub mod params;
pub mod registry;
pub mod snapshot;

pub use definition::{Direction, KpiConfig, KpiDefinition, KpiUnit};
pub use formula::{Formula, FormulaCatalog, FormulaSpec, KpiFormula, WeightedSpec, WeightedTerm};
pub use params::KpiParams;
pub use registry::KpiRegistry;
pub use snapshot::MetricSnapshot;
