//! Database access
//!
//! - ExecutionPort: retrying, pool-backed query execution
//! - PgConnectionSource: PostgreSQL pool adapter
//! - ScriptedExecutor: in-memory stand-in for tests

pub mod error;
pub mod port;
pub mod postgres;
pub mod retry;
pub mod row;
pub mod scripted;

pub use error::QueryError;
pub use port::{ConnectionSource, ExecutionPort, PooledConnection, Query, QueryExecutor};
pub use postgres::{DatabaseSettings, PgConnectionSource};
pub use retry::RetryPolicy;
pub use row::{Param, Row, Value};
pub use scripted::{Scripted, ScriptedExecutor};
