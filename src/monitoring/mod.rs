//! Monitoring Module
//!
//! Provides observability for the engine:
//! - Cache and computation metrics
//! - Structured logging setup

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metrics::{Counter, EngineMetrics, Histogram, MetricsSnapshot};
