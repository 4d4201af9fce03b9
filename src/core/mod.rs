//! Core utilities and common types for the KPI engine.

pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AnalyticsConfig, CacheConfig, RefreshConfig};
pub use error::{Error, Result};
pub use types::*;
