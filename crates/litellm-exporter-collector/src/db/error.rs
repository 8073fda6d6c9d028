//! Execution port errors

use litellm_exporter_common::ExporterError;
use thiserror::Error;

/// Errors raised while executing or decoding a query
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Connection unavailable: {0}")]
    Connection(String),

    #[error("Query timed out: {0}")]
    Timeout(String),

    #[error("Connection pool is closed")]
    PoolClosed,

    #[error("Database error{}: {message}", .code.as_deref().map(|c| format!(" [{}]", c)).unwrap_or_default())]
    Database {
        code: Option<String>,
        message: String,
    },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Column {column} missing from row")]
    MissingColumn { column: String },

    #[error("Column {column} has unexpected type: expected {expected}, got {actual}")]
    ColumnType {
        column: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<QueryError>,
    },
}

impl QueryError {
    /// Whether another attempt could succeed
    ///
    /// Anything raised by the driver while talking to the database is
    /// retried. Decode failures are deterministic and a closed pool means
    /// shutdown is underway.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            QueryError::Connection(_) | QueryError::Timeout(_) | QueryError::Database { .. }
        )
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => QueryError::Timeout("timed out acquiring a pooled connection".into()),
            sqlx::Error::PoolClosed => QueryError::PoolClosed,
            sqlx::Error::Io(e) => QueryError::Connection(e.to_string()),
            sqlx::Error::Tls(e) => QueryError::Connection(e.to_string()),
            sqlx::Error::Protocol(msg) => QueryError::Connection(msg),
            sqlx::Error::Database(db) => QueryError::Database {
                code: db.code().map(|c| c.into_owned()),
                message: db.message().to_string(),
            },
            sqlx::Error::ColumnNotFound(column) => QueryError::MissingColumn { column },
            e @ (sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::TypeNotFound { .. }
            | sqlx::Error::ColumnIndexOutOfBounds { .. }) => QueryError::Decode(e.to_string()),
            other => QueryError::Database {
                code: None,
                message: other.to_string(),
            },
        }
    }
}

impl From<QueryError> for ExporterError {
    fn from(err: QueryError) -> Self {
        ExporterError::Query(err.to_string())
    }
}
