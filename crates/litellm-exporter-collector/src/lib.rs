//! # LiteLLM Exporter Collector
//!
//! Periodically aggregates LiteLLM spend, rate-limit, budget and key data
//! from PostgreSQL and publishes it as metrics.
//!
//! ## Components
//!
//! - **Query Catalog** ([`catalog`]): fixed SQL, typed rows, metric table
//! - **Execution Port** ([`db`]): pooled, retrying query execution
//! - **Availability Gate** ([`readiness`]): waits for the schema to exist
//! - **Engine** ([`engine`]): rows to observations, with reconciliation
//! - **Metric Sink** ([`sink`]): Prometheus registry or in-memory storage
//! - **Collection Loop** ([`scheduler`]): single-flight periodic driver

pub mod catalog;
pub mod db;
pub mod engine;
pub mod readiness;
pub mod scheduler;
pub mod sink;

pub use catalog::{QueryFamily, REQUIRED_TABLES};
pub use db::{ExecutionPort, PgConnectionSource, QueryError, QueryExecutor, RetryPolicy};
pub use engine::{CycleReport, EngineConfig, MetricsEngine, StaleSeries};
pub use readiness::{AvailabilityGate, ReadinessState};
pub use scheduler::{CollectionLoop, Collector, GatedCollector, LoopState};
pub use sink::{InMemorySink, MetricSink, PrometheusSink};
