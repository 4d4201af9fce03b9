//! # kpi-engine - Role-based KPI analytics
//!
//! Computes business KPIs for a roofing CRM and serves them per role:
//! - **KPI registry**: immutable definitions with targets, units and TTLs
//! - **Engine**: read-through TTL cache, coalesced concurrent misses
//! - **Alerts**: severity bands against KPI targets, one open alert per KPI
//! - **Dashboards**: role profiles assembled from KPI snapshots
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kpi_engine::alerts::AlertEvaluator;
//! use kpi_engine::cache::MemoryCache;
//! use kpi_engine::core::{now, AnalyticsConfig, TimeWindow};
//! use kpi_engine::dashboard::DashboardAssembler;
//! use kpi_engine::engine::{AnalyticsEngine, RefreshScheduler};
//! use kpi_engine::kpi::{FormulaCatalog, KpiParams, KpiRegistry};
//! use kpi_engine::source::StaticSource;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> kpi_engine::Result<()> {
//!     let config = AnalyticsConfig::from_file("analytics.json")?;
//!     let registry = KpiRegistry::from_config(&config, &FormulaCatalog::new())?;
//!     let engine = AnalyticsEngine::new(
//!         Arc::new(registry),
//!         Arc::new(StaticSource::new()),
//!         Arc::new(MemoryCache::new()),
//!     )
//!     .with_alerts(Arc::new(AlertEvaluator::from_config(&config)));
//!     let refresh = RefreshScheduler::start(engine.clone(), &config.refresh);
//!     let dashboards = DashboardAssembler::from_config(engine, &config)?;
//!
//!     let window = TimeWindow::trailing(now(), chrono::Duration::days(30))?;
//!     let payload = dashboards.assemble("owner", &KpiParams::new(window)).await?;
//!     println!("{}", payload.to_json()?);
//!
//!     if let Some(refresh) = refresh {
//!         refresh.shutdown().await;
//!     }
//!     Ok(())
//! }
//! ```

pub mod alerts;
pub mod cache;
pub mod core;
pub mod dashboard;
pub mod engine;
pub mod kpi;
pub mod monitoring;
pub mod notify;
pub mod source;

pub use core::error::{Error, Result};
