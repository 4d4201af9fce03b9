//! Engine Module
//!
//! KPI computation over a metric source:
//! - Read-through caching with per-KPI TTL
//! - Coalescing of concurrent misses on one key
//! - Alert evaluation of fresh values
//! - Background refresh of the dashboard window

pub mod analytics;
pub mod refresh;

pub use analytics::AnalyticsEngine;
pub use refresh::{refresh_window, RefreshScheduler};
