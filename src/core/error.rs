//! Error types for the KPI engine.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in engine operations.
///
/// `Clone` so that every caller coalesced onto one in-flight computation
/// receives the same outcome.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Registry errors
    #[error("KPI already registered: {0}")]
    DuplicateKpi(String),

    #[error("KPI not found: {0}")]
    KpiNotFound(String),

    // Computation errors
    #[error("Metric source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    // Dashboard errors
    #[error("Role not found: {0}")]
    RoleNotFound(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Short machine-readable code, used in dashboard placeholders and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Error::DuplicateKpi(_) => "duplicate_kpi",
            Error::KpiNotFound(_) => "kpi_not_found",
            Error::SourceUnavailable(_) => "source_unavailable",
            Error::InvalidParameter(_) => "invalid_parameter",
            Error::RoleNotFound(_) => "role_not_found",
            Error::InvalidConfig(_) => "invalid_config",
            Error::Serialization(_) => "serialization",
            Error::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::InvalidConfig(err.to_string())
    }
}
