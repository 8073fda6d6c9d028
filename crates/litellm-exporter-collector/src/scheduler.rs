//! Collection loop
//!
//! `Idle -> Running -> Sleeping -> Running ...` until the cancellation token
//! fires, then `ShuttingDown -> Terminated`. Cycles never overlap: the next
//! one is scheduled from the end of the previous one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::db::QueryExecutor;
use crate::engine::{CycleReport, MetricsEngine};
use crate::readiness::AvailabilityGate;

/// Loop lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    Running,
    Sleeping,
    ShuttingDown,
    Terminated,
}

/// One unit of periodic work
#[async_trait]
pub trait Collector: Send + Sync + 'static {
    async fn collect(&self) -> CycleReport;
}

#[async_trait]
impl<E: QueryExecutor + 'static> Collector for MetricsEngine<E> {
    async fn collect(&self) -> CycleReport {
        self.update_all().await
    }
}

/// Engine behind the availability gate
///
/// Until the required tables exist, each cycle makes one existence pass and
/// skips the engine. Once they exist, no further checks are made.
pub struct GatedCollector<G, E> {
    gate: AvailabilityGate<G>,
    engine: MetricsEngine<E>,
    required: Vec<String>,
}

impl<G: QueryExecutor, E: QueryExecutor> GatedCollector<G, E> {
    pub fn new(gate: AvailabilityGate<G>, engine: MetricsEngine<E>, required: Vec<String>) -> Self {
        engine.record_readiness(gate.is_ready());
        Self {
            gate,
            engine,
            required,
        }
    }

    pub fn engine(&self) -> &MetricsEngine<E> {
        &self.engine
    }

    pub fn gate(&self) -> &AvailabilityGate<G> {
        &self.gate
    }
}

#[async_trait]
impl<G: QueryExecutor + 'static, E: QueryExecutor + 'static> Collector for GatedCollector<G, E> {
    async fn collect(&self) -> CycleReport {
        if !self.gate.is_ready() {
            let missing = self.gate.check_once(&self.required).await;
            if !missing.is_empty() {
                warn!(missing = ?missing, "Schema still not ready, skipping cycle");
                return CycleReport::skipped();
            }
            info!("Required tables now present, starting collection");
            self.engine.record_readiness(true);
        }
        self.engine.update_all().await
    }
}

/// Single-flight periodic driver for a [`Collector`]
pub struct CollectionLoop<C> {
    collector: Arc<C>,
    interval: Duration,
    cancel: CancellationToken,
    state: watch::Sender<LoopState>,
}

impl<C: Collector> CollectionLoop<C> {
    pub fn new(collector: Arc<C>, interval: Duration, cancel: CancellationToken) -> Self {
        let (state, _) = watch::channel(LoopState::Idle);
        Self {
            collector,
            interval,
            cancel,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    /// Run until cancelled, returning the number of cycles completed
    ///
    /// Each cycle runs on its own task so a panic inside it is caught and
    /// logged; the loop carries on with the next cycle.
    pub async fn run(self) -> u64 {
        info!(interval_secs = self.interval.as_secs_f64(), "Collection loop started");
        let mut cycles = 0u64;

        while !self.cancel.is_cancelled() {
            self.state.send_replace(LoopState::Running);

            let collector = Arc::clone(&self.collector);
            match tokio::spawn(async move { collector.collect().await }).await {
                Ok(report) if report.skipped => debug!("Cycle skipped"),
                Ok(report) if !report.failed.is_empty() => {
                    warn!(cycle_id = %report.cycle_id, failed = report.failed.len(), "Cycle finished with failures")
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "Collection cycle aborted"),
            }
            cycles += 1;

            self.state.send_replace(LoopState::Sleeping);
            if !self.sleep().await {
                break;
            }
        }

        self.state.send_replace(LoopState::ShuttingDown);
        info!(cycles, "Collection loop stopping");
        self.state.send_replace(LoopState::Terminated);
        cycles
    }

    /// Sleep one interval in steps of at most a second, `false` if cancelled
    async fn sleep(&self) -> bool {
        let deadline = Instant::now() + self.interval;
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            let step = (deadline - now).min(Duration::from_secs(1));
            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                _ = tokio::time::sleep(step) => {}
            }
        }
    }
}
