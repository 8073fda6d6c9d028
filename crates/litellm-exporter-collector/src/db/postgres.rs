//! PostgreSQL connection pool
//!
//! Wraps a `sqlx` pool. Statements run in autocommit mode (no explicit
//! transaction); every catalog query is a read-only aggregation.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use litellm_exporter_common::{ExporterError, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query as SqlxQuery;
use sqlx::{Column, Postgres, Row as _, TypeInfo};
use tracing::{info, instrument};

use super::error::QueryError;
use super::port::{ConnectionSource, PooledConnection};
use super::row::{Param, Row, Value};

/// Database connection settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    /// Database name
    pub name: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub min_connections: u32,
    pub max_connections: u32,
    /// Bound on waiting for a free pooled connection
    pub acquire_timeout_secs: u64,
    /// Server-side statement timeout, 0 disables it
    pub statement_timeout_secs: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            name: "litellm".to_string(),
            user: "litellm".to_string(),
            password: String::new(),
            min_connections: 1,
            max_connections: 10,
            acquire_timeout_secs: 30,
            statement_timeout_secs: 60,
        }
    }
}

impl std::fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"***")
            .field("min_connections", &self.min_connections)
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .field("statement_timeout_secs", &self.statement_timeout_secs)
            .finish()
    }
}

impl DatabaseSettings {
    /// Check pool bounds
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(ExporterError::Config("database.max_connections must be at least 1".into()));
        }
        if self.min_connections > self.max_connections {
            return Err(ExporterError::Config(format!(
                "database.min_connections ({}) exceeds max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        Ok(())
    }

    fn connect_options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.name)
            .username(&self.user)
            .password(&self.password)
            .application_name("litellm-exporter");

        if self.statement_timeout_secs > 0 {
            options.options([("statement_timeout", format!("{}s", self.statement_timeout_secs))])
        } else {
            options
        }
    }
}

/// Pooled PostgreSQL connection source
#[derive(Clone)]
pub struct PgConnectionSource {
    pool: PgPool,
}

impl PgConnectionSource {
    /// Build the pool and open the first connection
    ///
    /// Failure here (bad credentials, unreachable host) is the only error
    /// that stops the exporter.
    #[instrument(skip(settings), fields(host = %settings.host, database = %settings.name))]
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        settings.validate()?;

        let pool = PgPoolOptions::new()
            .min_connections(settings.min_connections)
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
            .connect_with(settings.connect_options())
            .await
            .map_err(|e| ExporterError::Startup(format!("Failed to create connection pool: {}", e)))?;

        info!(
            min = settings.min_connections,
            max = settings.max_connections,
            "Database connection pool created"
        );
        Ok(Self { pool })
    }

    /// Build the pool without connecting; connections open on first use
    pub fn connect_lazy(settings: &DatabaseSettings) -> Result<Self> {
        settings.validate()?;

        let pool = PgPoolOptions::new()
            .min_connections(settings.min_connections)
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
            .connect_lazy_with(settings.connect_options());
        Ok(Self { pool })
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Connections currently open (idle or borrowed)
    pub fn size(&self) -> u32 {
        self.pool.size()
    }

    /// Close the pool, waiting for borrowed connections to come back
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database connection pool closed");
    }
}

#[async_trait]
impl ConnectionSource for PgConnectionSource {
    type Connection = PgPooledConnection;

    async fn acquire(&self) -> std::result::Result<PgPooledConnection, QueryError> {
        let conn = self.pool.acquire().await?;
        Ok(PgPooledConnection { conn })
    }
}

/// Borrowed connection, returned to the pool on drop
pub struct PgPooledConnection {
    conn: PoolConnection<Postgres>,
}

#[async_trait]
impl PooledConnection for PgPooledConnection {
    async fn fetch_all(&mut self, sql: &str, params: &[Param]) -> std::result::Result<Vec<Row>, QueryError> {
        let rows = bind_params(sqlx::query(sql), params)
            .fetch_all(&mut *self.conn)
            .await?;
        rows.iter().map(decode_row).collect()
    }
}

fn bind_params<'q>(
    mut query: SqlxQuery<'q, Postgres, PgArguments>,
    params: &[Param],
) -> SqlxQuery<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            Param::Text(s) => query.bind(s.clone()),
            Param::Int(i) => query.bind(*i),
            Param::Float(f) => query.bind(*f),
        };
    }
    query
}

/// Column types the decoder understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    TimestampTz,
    Timestamp,
    Text,
}

/// Map a Postgres type name to a decoder; anything else fails the row
fn column_kind(column: &str, type_name: &str) -> std::result::Result<ColumnKind, QueryError> {
    Ok(match type_name {
        "BOOL" => ColumnKind::Bool,
        "INT2" => ColumnKind::Int2,
        "INT4" => ColumnKind::Int4,
        "INT8" => ColumnKind::Int8,
        "FLOAT4" => ColumnKind::Float4,
        "FLOAT8" => ColumnKind::Float8,
        "NUMERIC" => ColumnKind::Numeric,
        "TIMESTAMPTZ" => ColumnKind::TimestampTz,
        "TIMESTAMP" => ColumnKind::Timestamp,
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => ColumnKind::Text,
        other => {
            return Err(QueryError::Decode(format!(
                "column {} has unsupported type {}",
                column, other
            )))
        }
    })
}

/// Convert a driver row into an ordered column/value row
fn decode_row(row: &PgRow) -> std::result::Result<Row, QueryError> {
    let mut out = Row::with_capacity(row.columns().len());
    for column in row.columns() {
        let idx = column.ordinal();
        let value = match column_kind(column.name(), column.type_info().name())? {
            ColumnKind::Bool => row.try_get::<Option<bool>, _>(idx)?.map(Value::Bool),
            ColumnKind::Int2 => row.try_get::<Option<i16>, _>(idx)?.map(|v| Value::Int(v.into())),
            ColumnKind::Int4 => row.try_get::<Option<i32>, _>(idx)?.map(|v| Value::Int(v.into())),
            ColumnKind::Int8 => row.try_get::<Option<i64>, _>(idx)?.map(Value::Int),
            ColumnKind::Float4 => row.try_get::<Option<f32>, _>(idx)?.map(|v| Value::Float(v.into())),
            ColumnKind::Float8 => row.try_get::<Option<f64>, _>(idx)?.map(Value::Float),
            ColumnKind::Numeric => row
                .try_get::<Option<Decimal>, _>(idx)?
                .map(|d| Value::Float(d.to_f64().unwrap_or(f64::NAN))),
            ColumnKind::TimestampTz => row.try_get::<Option<DateTime<Utc>>, _>(idx)?.map(Value::Timestamp),
            ColumnKind::Timestamp => row
                .try_get::<Option<NaiveDateTime>, _>(idx)?
                .map(|t| Value::Timestamp(t.and_utc())),
            ColumnKind::Text => row.try_get::<Option<String>, _>(idx)?.map(Value::Text),
        };
        out.push(column.name(), value.unwrap_or(Value::Null));
    }
    Ok(out)
}
