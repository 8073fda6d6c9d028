//! Availability gate
//!
//! Waits for the gateway's schema migration to create the tables the
//! catalog reads. Never fails: a check that errors counts as a missing
//! table, and running out of time just reports `false`.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use litellm_exporter_common::{
    TABLE_CHECK_TIMEOUT_SECS, TABLE_WAIT_INITIAL_BACKOFF_SECS, TABLE_WAIT_MAX_BACKOFF_SECS,
};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::catalog::queries::TABLE_EXISTS;
use crate::catalog::rows::TableExistsRow;
use crate::db::{ConnectionSource, ExecutionPort, Param, QueryExecutor, RetryPolicy};

/// Outcome of the most recent existence pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReadinessState {
    /// Tables looked up so far
    pub checked_tables: BTreeSet<String>,
    /// Every required table was found by the last pass
    pub all_present: bool,
    /// Tables missing from the last pass
    pub missing: Vec<String>,
    /// When the last pass finished
    pub last_check: Option<DateTime<Utc>>,
}

/// Table existence gate with capped exponential backoff
pub struct AvailabilityGate<E> {
    executor: E,
    state: RwLock<ReadinessState>,
    initial_backoff: Duration,
    max_backoff: Duration,
    /// Bound on a single existence check
    check_timeout: Duration,
}

impl<S: ConnectionSource> AvailabilityGate<ExecutionPort<S>> {
    /// Gate over its own single-attempt port on `source`
    ///
    /// A failed check counts as missing straight away; the gate's backoff
    /// is the only retry schedule.
    pub fn over_source(source: S) -> Self {
        Self::new(ExecutionPort::new(source, RetryPolicy::none()))
    }
}

impl<E: QueryExecutor> AvailabilityGate<E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            state: RwLock::new(ReadinessState::default()),
            initial_backoff: Duration::from_secs(TABLE_WAIT_INITIAL_BACKOFF_SECS),
            max_backoff: Duration::from_secs(TABLE_WAIT_MAX_BACKOFF_SECS),
            check_timeout: Duration::from_secs(TABLE_CHECK_TIMEOUT_SECS),
        }
    }

    /// Override the backoff schedule
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    pub fn state(&self) -> ReadinessState {
        self.state.read().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.state.read().all_present
    }

    /// Whether `table` exists in the public schema; errors and timeouts read as absent
    #[instrument(skip(self))]
    pub async fn table_exists(&self, table: &str) -> bool {
        let params = [Param::Text(table.to_string())];
        let query = TABLE_EXISTS;
        let check = self.executor.execute(&query, &params);
        match tokio::time::timeout(self.check_timeout, check).await {
            Ok(Ok(rows)) => rows
                .first()
                .and_then(|row| TableExistsRow::try_from(row).ok())
                .map(|row| row.exists)
                .unwrap_or(false),
            Ok(Err(e)) => {
                warn!(error = %e, "Table existence check failed");
                false
            }
            Err(_) => {
                warn!(timeout_secs = self.check_timeout.as_secs_f64(), "Table existence check timed out");
                false
            }
        }
    }

    /// One pass over `required`, returning the missing tables
    pub async fn check_once(&self, required: &[String]) -> Vec<String> {
        let mut missing = Vec::new();
        for table in required {
            if !self.table_exists(table).await {
                missing.push(table.clone());
            }
        }

        let mut state = self.state.write();
        state.checked_tables.extend(required.iter().cloned());
        state.all_present = missing.is_empty();
        state.missing = missing.clone();
        state.last_check = Some(Utc::now());
        missing
    }

    /// Wait until every required table exists or `max_wait` runs out
    ///
    /// A pass only starts while less than `max_wait` has elapsed; the sleep
    /// after a failed pass is not shortened, so the call can return up to
    /// one backoff step past `max_wait`. Cancellation ends the wait early
    /// with `false`.
    #[instrument(skip(self, required, cancel), fields(tables = required.len()))]
    pub async fn wait_for_tables(
        &self,
        required: &[String],
        max_wait: Duration,
        cancel: &CancellationToken,
    ) -> bool {
        let start = Instant::now();
        let mut backoff = self.initial_backoff;

        while start.elapsed() < max_wait {
            let missing = self.check_once(required).await;
            if missing.is_empty() {
                info!(elapsed_secs = start.elapsed().as_secs_f64(), "All required tables present");
                return true;
            }

            warn!(
                missing = ?missing,
                retry_in_secs = backoff.as_secs(),
                "Required tables missing, waiting"
            );
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Table wait cancelled");
                    return false;
                }
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(self.max_backoff);
        }

        warn!(
            max_wait_secs = max_wait.as_secs(),
            missing = ?self.state.read().missing,
            "Timed out waiting for required tables"
        );
        false
    }
}
