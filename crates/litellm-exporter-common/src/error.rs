//! Error types for the exporter
//!
//! Mirrors the failure classes the exporter distinguishes at runtime:
//! schema readiness, query execution, per-family aggregation, startup,
//! configuration and metric publication.

use thiserror::Error;

/// Result type alias using ExporterError
pub type Result<T> = std::result::Result<T, ExporterError>;

/// Unified error type for exporter operations
#[derive(Debug, Error)]
pub enum ExporterError {
    // Required tables still absent after the bounded wait. Never fatal.
    #[error("Schema not ready: missing tables {missing:?}")]
    SchemaNotReady { missing: Vec<String> },

    // Query execution failed after the retry policy gave up
    #[error("Query error: {0}")]
    Query(String),

    // One query family failed; the rest of the cycle continues
    #[error("Aggregation failed for {family}: {reason}")]
    Aggregation { family: String, reason: String },

    // The pool could not be built at all
    #[error("Startup error: {0}")]
    Startup(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metric sink error: {0}")]
    Sink(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExporterError {
    /// Whether this error must terminate the process
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExporterError::Startup(_) | ExporterError::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ExporterError::SchemaNotReady {
            missing: vec!["LiteLLM_SpendLogs".to_string()],
        };
        assert!(err.to_string().contains("LiteLLM_SpendLogs"));
    }

    #[test]
    fn test_aggregation_error() {
        let err = ExporterError::Aggregation {
            family: "budgets".to_string(),
            reason: "relation does not exist".to_string(),
        };
        assert!(err.to_string().contains("budgets"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_only_startup_and_config_are_fatal() {
        assert!(ExporterError::Startup("bad credentials".into()).is_fatal());
        assert!(ExporterError::Config("bad window".into()).is_fatal());
        assert!(!ExporterError::Query("timeout".into()).is_fatal());
        assert!(!ExporterError::SchemaNotReady { missing: vec![] }.is_fatal());
    }
}
