//! # LiteLLM Exporter Common
//!
//! Shared types and errors for the LiteLLM metrics exporter.
//!
//! ## Core Types
//!
//! - [`EntityKind`]: users, teams, organizations and API keys
//! - [`TimeWindow`]: trailing `[now - duration, now)` aggregation windows
//! - [`LabelSet`]: deterministically ordered metric labels
//! - [`MetricObservation`]: one value for one labelled series
//! - [`ExporterError`]: process-wide error taxonomy

pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{ExporterError, Result};
pub use types::{
    entity::{EntityKind, NO_ALIAS},
    observation::{LabelSet, MetricKind, MetricObservation},
    window::{parse_duration, TimeWindow},
};

/// Exporter version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prefix shared by every published metric
pub const METRIC_PREFIX: &str = "litellm_";

/// Fixed trailing window for current TPM/RPM
pub const CURRENT_RATE_WINDOW_SECS: u64 = 60;

/// Fixed window for key spend recomputed from logs
pub const KEY_SPEND_WINDOW_SECS: u64 = 30 * 86_400;

/// First sleep between table availability checks
pub const TABLE_WAIT_INITIAL_BACKOFF_SECS: u64 = 1;

/// Cap on the table availability backoff
pub const TABLE_WAIT_MAX_BACKOFF_SECS: u64 = 30;

/// Bound on one table existence check
pub const TABLE_CHECK_TIMEOUT_SECS: u64 = 5;

/// Default bound on waiting for required tables at startup
pub const DEFAULT_TABLE_WAIT_SECS: u64 = 300;

/// Attempts per query before the execution port gives up
pub const QUERY_MAX_ATTEMPTS: u32 = 5;

/// Label used for missing models
pub const UNKNOWN_MODEL: &str = "unknown";
