//! Alerts Module
//!
//! Threshold alerting over computed KPI values:
//! - Severity bands relative to the KPI target
//! - Business alerts with an open/resolved lifecycle
//! - Evaluator keeping one open alert per KPI

pub mod alert;
pub mod evaluator;
pub mod policy;

pub use alert::{AlertSeverity, AlertTransition, BusinessAlert};
pub use evaluator::AlertEvaluator;
pub use policy::{deviation, AlertPolicy};
