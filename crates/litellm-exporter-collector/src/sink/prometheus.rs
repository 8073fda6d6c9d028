//! Prometheus registry sink

use std::collections::HashMap;

use litellm_exporter_common::{ExporterError, LabelSet, MetricKind, Result};
use ::prometheus::{CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};
use tracing::debug;

use super::{check_delta, resolve, MetricSink};
use crate::catalog::METRICS;

/// Sink backed by a Prometheus registry, one vector per catalog metric
pub struct PrometheusSink {
    registry: Registry,
    gauges: HashMap<&'static str, GaugeVec>,
    counters: HashMap<&'static str, CounterVec>,
}

impl PrometheusSink {
    pub fn new() -> Result<Self> {
        Self::with_registry(Registry::new())
    }

    /// Register every catalog metric into `registry`
    pub fn with_registry(registry: Registry) -> Result<Self> {
        let mut gauges = HashMap::new();
        let mut counters = HashMap::new();

        for desc in METRICS {
            let opts = Opts::new(desc.name, desc.help);
            match desc.kind {
                MetricKind::Gauge => {
                    let vec = GaugeVec::new(opts, desc.labels).map_err(registration_error)?;
                    registry.register(Box::new(vec.clone())).map_err(registration_error)?;
                    gauges.insert(desc.name, vec);
                }
                MetricKind::Counter => {
                    let vec = CounterVec::new(opts, desc.labels).map_err(registration_error)?;
                    registry.register(Box::new(vec.clone())).map_err(registration_error)?;
                    counters.insert(desc.name, vec);
                }
            }
        }

        debug!(gauges = gauges.len(), counters = counters.len(), "Registered metric families");
        Ok(Self {
            registry,
            gauges,
            counters,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render the registry in the Prometheus text format
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| ExporterError::Sink(format!("Failed to encode metrics: {}", e)))?;
        String::from_utf8(buffer).map_err(|e| ExporterError::Sink(e.to_string()))
    }

    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }
}

fn registration_error(err: ::prometheus::Error) -> ExporterError {
    ExporterError::Sink(format!("Failed to register metric: {}", err))
}

impl MetricSink for PrometheusSink {
    fn set_gauge(&self, name: &str, labels: &LabelSet, value: f64) -> Result<()> {
        let (desc, values) = resolve(name, labels, MetricKind::Gauge)?;
        let vec = self
            .gauges
            .get(desc.name)
            .ok_or_else(|| ExporterError::Sink(format!("gauge {} not registered", name)))?;
        vec.get_metric_with_label_values(&values)
            .map_err(|e| ExporterError::Sink(e.to_string()))?
            .set(value);
        Ok(())
    }

    fn increment_counter(&self, name: &str, labels: &LabelSet, delta: f64) -> Result<()> {
        check_delta(name, delta)?;
        let (desc, values) = resolve(name, labels, MetricKind::Counter)?;
        let vec = self
            .counters
            .get(desc.name)
            .ok_or_else(|| ExporterError::Sink(format!("counter {} not registered", name)))?;
        vec.get_metric_with_label_values(&values)
            .map_err(|e| ExporterError::Sink(e.to_string()))?
            .inc_by(delta);
        Ok(())
    }

    fn remove_series(&self, name: &str, labels: &LabelSet) -> Result<()> {
        let desc = crate::catalog::metrics::descriptor(name)
            .ok_or_else(|| ExporterError::Sink(format!("unknown metric {}", name)))?;
        let (_, values) = resolve(name, labels, desc.kind)?;
        // An absent series is already removed
        let _ = match desc.kind {
            MetricKind::Gauge => self.gauges.get(desc.name).map(|v| v.remove_label_values(&values)),
            MetricKind::Counter => self.counters.get(desc.name).map(|v| v.remove_label_values(&values)),
        };
        Ok(())
    }
}
