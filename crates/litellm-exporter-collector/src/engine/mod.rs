//! Aggregation & reconciliation engine
//!
//! Runs every query family once per cycle, turns typed rows into
//! observations, publishes them and retires series that dropped out.
//!
//! Families are isolated from each other: a family whose query fails keeps
//! its last published values for the cycle, and one that has never
//! succeeded publishes nothing.

pub mod budgets;
pub mod current_rates;
pub mod keys;
pub mod rate_limits;
pub mod reconcile;
pub mod series;
pub mod spend;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use litellm_exporter_common::{ExporterError, LabelSet, MetricObservation, Result, TimeWindow};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::catalog::metrics::{COLLECTION_CYCLES, CYCLE_DURATION, LAST_SUCCESS, QUERY_FAILURES, SCHEMA_READY, WINDOW_SECONDS};
use crate::catalog::QueryFamily;
use crate::db::{QueryError, QueryExecutor};
use crate::sink::MetricSink;

pub use reconcile::{Reconciler, StaleEntry, StaleSeries};
pub use series::SeriesSet;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Window for spend, token, request and cache metrics
    pub spend_window: TimeWindow,
    /// Reported only, no family aggregates over it
    pub request_window: TimeWindow,
    /// Reported only, no family aggregates over it
    pub error_window: TimeWindow,
    pub stale_series: StaleSeries,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            spend_window: TimeWindow::new("spend", Duration::from_secs(30 * 86_400)),
            request_window: TimeWindow::new("request", Duration::from_secs(86_400)),
            error_window: TimeWindow::new("error", Duration::from_secs(3_600)),
            stale_series: StaleSeries::default(),
        }
    }
}

impl EngineConfig {
    /// Every window in use, configured and fixed
    pub fn windows(&self) -> Vec<TimeWindow> {
        vec![
            self.spend_window.clone(),
            self.request_window.clone(),
            self.error_window.clone(),
            TimeWindow::new("current_rate", current_rates::WINDOW),
            TimeWindow::new("key_spend", keys::SPEND_WINDOW),
        ]
    }
}

/// Summary of one collection cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub succeeded: Vec<QueryFamily>,
    pub failed: Vec<(QueryFamily, String)>,
    /// Series written this cycle
    pub published: usize,
    /// Stale series removed or zeroed this cycle
    pub retired: usize,
    /// Cycle skipped because the schema is not ready
    pub skipped: bool,
}

impl CycleReport {
    fn begin() -> Self {
        Self {
            cycle_id: Uuid::now_v7(),
            started_at: Utc::now(),
            duration: Duration::ZERO,
            succeeded: Vec::new(),
            failed: Vec::new(),
            published: 0,
            retired: 0,
            skipped: false,
        }
    }

    /// A cycle that did not touch the database families
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::begin()
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.skipped && self.failed.is_empty()
    }
}

/// Aggregation engine over an executor and a sink
pub struct MetricsEngine<E> {
    executor: E,
    sink: Arc<dyn MetricSink>,
    config: EngineConfig,
    reconciler: Mutex<Reconciler>,
}

impl<E: QueryExecutor> MetricsEngine<E> {
    pub fn new(executor: E, sink: Arc<dyn MetricSink>, config: EngineConfig) -> Self {
        Self {
            executor,
            sink,
            config,
            reconciler: Mutex::new(Reconciler::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sink(&self) -> &Arc<dyn MetricSink> {
        &self.sink
    }

    /// Publish the window lengths as `litellm_exporter_window_seconds`
    pub fn publish_windows(&self) -> Result<()> {
        for window in self.config.windows() {
            self.sink.set_gauge(
                WINDOW_SECONDS,
                &LabelSet::new().with("window", window.name.as_str()),
                window.as_secs_f64(),
            )?;
            info!(window = %window.name, secs = window.duration.as_secs(), "Aggregation window");
        }
        Ok(())
    }

    pub fn record_readiness(&self, ready: bool) {
        self.self_metric(self.sink.set_gauge(SCHEMA_READY, &LabelSet::new(), if ready { 1.0 } else { 0.0 }));
    }

    /// Run one family's queries and build its observations
    #[instrument(skip(self), fields(family = %family))]
    pub async fn collect_family(&self, family: QueryFamily) -> std::result::Result<Vec<MetricObservation>, QueryError> {
        let executor = &self.executor;
        match family {
            QueryFamily::Spend => spend::collect(executor, &self.config.spend_window).await,
            QueryFamily::RateLimits => rate_limits::collect(executor).await,
            QueryFamily::Budgets => budgets::collect(executor).await,
            QueryFamily::Keys => keys::collect_keys(executor).await,
            QueryFamily::KeySpend => keys::collect_key_spend(executor).await,
            QueryFamily::KeyBudgets => keys::collect_key_budgets(executor).await,
            QueryFamily::CurrentRates => current_rates::collect(executor).await,
        }
    }

    /// Publish a family's observations and retire what dropped out
    ///
    /// Every observation and retirement is attempted even when one of them
    /// fails, so the sink and the reconciler agree on the published set.
    /// The first sink error is returned. Returns `(published, retired)`.
    pub fn publish(&self, family: QueryFamily, observations: &[MetricObservation]) -> Result<(usize, usize)> {
        let mut first_error = None;
        for observation in observations {
            if let Err(e) = self.sink.observe(observation) {
                first_error.get_or_insert(e);
            }
        }

        let stale = self.reconciler.lock().reconcile(family, observations);
        for entry in &stale {
            let retired = match self.config.stale_series {
                StaleSeries::Remove => self.sink.remove_series(entry.metric, &entry.labels),
                StaleSeries::Zero => self.sink.set_gauge(entry.metric, &entry.labels, 0.0),
            };
            if let Err(e) = retired {
                first_error.get_or_insert(e);
            }
        }
        if !stale.is_empty() {
            debug!(family = %family, retired = stale.len(), "Retired stale series");
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok((observations.len(), stale.len())),
        }
    }

    /// Run every family once
    ///
    /// Never fails: per-family errors are logged, counted and reported.
    #[instrument(skip(self))]
    pub async fn update_all(&self) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::begin();

        for family in QueryFamily::ALL {
            let outcome = match self.collect_family(family).await {
                Ok(observations) => self.publish(family, &observations),
                Err(e) => Err(ExporterError::Aggregation {
                    family: family.to_string(),
                    reason: e.to_string(),
                }),
            };

            let family_label = LabelSet::new().with("family", family.as_str());
            match outcome {
                Ok((published, retired)) => {
                    report.succeeded.push(family);
                    report.published += published;
                    report.retired += retired;
                    self.self_metric(self.sink.set_gauge(
                        LAST_SUCCESS,
                        &family_label,
                        Utc::now().timestamp_millis() as f64 / 1000.0,
                    ));
                }
                Err(e) => {
                    error!(family = %family, error = %e, "Family collection failed, keeping last values");
                    report.failed.push((family, e.to_string()));
                    self.self_metric(self.sink.increment_counter(QUERY_FAILURES, &family_label, 1.0));
                }
            }
        }

        report.duration = started.elapsed();
        self.self_metric(self.sink.increment_counter(COLLECTION_CYCLES, &LabelSet::new(), 1.0));
        self.self_metric(self.sink.set_gauge(CYCLE_DURATION, &LabelSet::new(), report.duration.as_secs_f64()));

        info!(
            cycle_id = %report.cycle_id,
            duration_ms = report.duration.as_millis() as u64,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            published = report.published,
            retired = report.retired,
            "Collection cycle finished"
        );
        report
    }

    fn self_metric(&self, result: Result<()>) {
        if let Err(e) = result {
            warn!(error = %e, "Failed to publish exporter metric");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::metrics::{BLOCKED_STATUS, CURRENT_TPM, MAX_BUDGET, TOTAL_SPEND, USER_SPEND};
    use crate::db::{Row, Scripted, ScriptedExecutor, Value};
    use crate::sink::InMemorySink;

    fn spend_row(model: &str, user: Option<&str>, spend: f64) -> Row {
        Row::new()
            .with("model", model)
            .with("user_id", user)
            .with("user_alias", Value::Null)
            .with("team_id", Value::Null)
            .with("team_alias", Value::Null)
            .with("organization_id", Value::Null)
            .with("organization_alias", Value::Null)
            .with("cache_hit", "false")
            .with("total_spend", spend)
            .with("total_tokens", 10i64)
            .with("prompt_tokens", 5i64)
            .with("completion_tokens", 5i64)
            .with("request_count", 1i64)
    }

    fn team_budget(id: &str, max: f64) -> Row {
        Row::new()
            .with("entity_id", id)
            .with("entity_alias", Value::Null)
            .with("max_budget", max)
            .with("soft_budget", Value::Null)
            .with("budget_reset_at", Value::Null)
            .with("current_spend", Value::Null)
    }

    fn engine(
        executor: Arc<ScriptedExecutor>,
        stale_series: StaleSeries,
    ) -> (MetricsEngine<Arc<ScriptedExecutor>>, Arc<InMemorySink>) {
        let sink = Arc::new(InMemorySink::new());
        let config = EngineConfig {
            stale_series,
            ..Default::default()
        };
        (MetricsEngine::new(executor, sink.clone(), config), sink)
    }

    fn user(id: &str) -> LabelSet {
        LabelSet::new()
            .with("model", "gpt-4")
            .with("user_id", id)
            .with("user_alias", "none")
    }

    #[tokio::test]
    async fn test_vanished_entity_is_removed() {
        let executor = Arc::new(ScriptedExecutor::new());
        let (engine, sink) = engine(executor.clone(), StaleSeries::Remove);

        executor.respond("spend", vec![spend_row("gpt-4", Some("u1"), 1.0), spend_row("gpt-4", Some("u2"), 2.0)]);
        let first = engine.update_all().await;
        assert!(first.is_complete());
        assert_eq!(sink.get(USER_SPEND, &user("u1")), Some(1.0));

        executor.respond("spend", vec![spend_row("gpt-4", Some("u2"), 2.0)]);
        let second = engine.update_all().await;
        assert_eq!(sink.get(USER_SPEND, &user("u1")), None);
        assert_eq!(sink.get(USER_SPEND, &user("u2")), Some(2.0));
        assert_eq!(second.retired, 1);
    }

    #[tokio::test]
    async fn test_vanished_entity_zeroed_then_forgotten() {
        let executor = Arc::new(ScriptedExecutor::new());
        let (engine, sink) = engine(executor.clone(), StaleSeries::Zero);

        executor.respond("spend", vec![spend_row("gpt-4", Some("u1"), 1.0)]);
        engine.update_all().await;

        executor.respond("spend", vec![]);
        engine.update_all().await;
        assert_eq!(sink.get(USER_SPEND, &user("u1")), Some(0.0));
        assert_eq!(sink.get(TOTAL_SPEND, &LabelSet::new().with("model", "gpt-4")), Some(0.0));

        let third = engine.update_all().await;
        assert_eq!(third.retired, 0);
    }

    #[tokio::test]
    async fn test_failed_family_keeps_last_values() {
        let executor = Arc::new(ScriptedExecutor::new());
        let (engine, sink) = engine(executor.clone(), StaleSeries::Remove);
        let team = LabelSet::new()
            .with("entity_type", "team")
            .with("entity_id", "t1")
            .with("entity_alias", "none");

        executor.respond("budgets.team", vec![team_budget("t1", 100.0)]);
        engine.update_all().await;
        assert_eq!(sink.get(MAX_BUDGET, &team), Some(100.0));

        executor.respond_once("budgets.user", Scripted::Fail("relation does not exist".into()));
        executor.respond("budgets.team", vec![]);
        let report = engine.update_all().await;

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, QueryFamily::Budgets);
        assert_eq!(report.succeeded.len(), QueryFamily::ALL.len() - 1);
        assert_eq!(sink.get(MAX_BUDGET, &team), Some(100.0));
        assert_eq!(
            sink.get(QUERY_FAILURES, &LabelSet::new().with("family", "budgets")),
            Some(1.0)
        );
    }

    #[tokio::test]
    async fn test_family_absent_until_first_success() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.fail("rate_limits.team", "timeout");
        let (engine, sink) = engine(executor.clone(), StaleSeries::Remove);

        let report = engine.update_all().await;
        assert!(!report.is_complete());
        assert!(sink.series(BLOCKED_STATUS).is_empty());
        assert!(sink
            .get(LAST_SUCCESS, &LabelSet::new().with("family", "rate_limits"))
            .is_none());
        assert!(sink
            .get(LAST_SUCCESS, &LabelSet::new().with("family", "spend"))
            .is_some());
    }

    #[tokio::test]
    async fn test_identical_data_identical_publication() {
        let executor = Arc::new(ScriptedExecutor::new());
        let (engine, _) = engine(executor.clone(), StaleSeries::Remove);
        executor.respond(
            "spend",
            vec![spend_row("b", Some("u2"), 1.0), spend_row("a", Some("u1"), 2.0)],
        );

        let first = engine.collect_family(QueryFamily::Spend).await.unwrap();
        let second = engine.collect_family(QueryFamily::Spend).await.unwrap();
        assert_eq!(first, second);
    }

    /// Sink rejecting every series for one user
    struct RejectingSink {
        inner: InMemorySink,
        rejected_user: &'static str,
    }

    impl MetricSink for RejectingSink {
        fn set_gauge(&self, name: &str, labels: &LabelSet, value: f64) -> Result<()> {
            if labels.get("user_id") == Some(self.rejected_user) {
                return Err(ExporterError::Sink(format!("rejected {}", labels)));
            }
            self.inner.set_gauge(name, labels, value)
        }

        fn increment_counter(&self, name: &str, labels: &LabelSet, delta: f64) -> Result<()> {
            self.inner.increment_counter(name, labels, delta)
        }

        fn remove_series(&self, name: &str, labels: &LabelSet) -> Result<()> {
            self.inner.remove_series(name, labels)
        }
    }

    #[tokio::test]
    async fn test_sink_error_does_not_skip_reconciliation() {
        let executor = Arc::new(ScriptedExecutor::new());
        let sink = Arc::new(RejectingSink {
            inner: InMemorySink::new(),
            rejected_user: "u3",
        });
        let engine = MetricsEngine::new(executor.clone(), sink.clone(), EngineConfig::default());

        executor.respond("spend", vec![spend_row("gpt-4", Some("u1"), 1.0)]);
        assert!(engine.update_all().await.is_complete());

        executor.respond(
            "spend",
            vec![spend_row("gpt-4", Some("u2"), 2.0), spend_row("gpt-4", Some("u3"), 3.0)],
        );
        let report = engine.update_all().await;

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, QueryFamily::Spend);
        assert_eq!(sink.inner.get(USER_SPEND, &user("u1")), None);
        assert_eq!(sink.inner.get(USER_SPEND, &user("u2")), Some(2.0));
        assert_eq!(
            sink.inner.get(TOTAL_SPEND, &LabelSet::new().with("model", "gpt-4")),
            Some(5.0)
        );
    }

    #[tokio::test]
    async fn test_self_metrics() {
        let executor = Arc::new(ScriptedExecutor::new());
        let (engine, sink) = engine(executor, StaleSeries::Remove);

        engine.publish_windows().unwrap();
        engine.record_readiness(true);
        engine.update_all().await;
        engine.update_all().await;

        assert_eq!(sink.get(COLLECTION_CYCLES, &LabelSet::new()), Some(2.0));
        assert_eq!(sink.get(SCHEMA_READY, &LabelSet::new()), Some(1.0));
        assert_eq!(
            sink.get(WINDOW_SECONDS, &LabelSet::new().with("window", "current_rate")),
            Some(60.0)
        );
        assert_eq!(
            sink.get(WINDOW_SECONDS, &LabelSet::new().with("window", "spend")),
            Some(2_592_000.0)
        );
        assert!(sink.series(CURRENT_TPM).is_empty());
    }
}
