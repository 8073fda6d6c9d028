//! Metric sinks
//!
//! The engine publishes through [`MetricSink`]; sinks own storage and
//! exposition. Each individual set/increment/remove is atomic, but a reader
//! may observe a cycle half-applied.

pub mod memory;
pub mod prometheus;

use std::sync::Arc;

use litellm_exporter_common::{ExporterError, LabelSet, MetricKind, MetricObservation, Result};

use crate::catalog::metrics::{descriptor, MetricDescriptor};

pub use self::memory::InMemorySink;
pub use self::prometheus::PrometheusSink;

/// Destination for metric observations
pub trait MetricSink: Send + Sync {
    fn set_gauge(&self, name: &str, labels: &LabelSet, value: f64) -> Result<()>;

    /// Add a non-negative delta to a counter
    fn increment_counter(&self, name: &str, labels: &LabelSet, delta: f64) -> Result<()>;

    /// Drop one series; removing an unknown series is not an error
    fn remove_series(&self, name: &str, labels: &LabelSet) -> Result<()>;

    fn observe(&self, observation: &MetricObservation) -> Result<()> {
        match observation.kind {
            MetricKind::Gauge => self.set_gauge(observation.metric_name, &observation.labels, observation.value),
            MetricKind::Counter => {
                self.increment_counter(observation.metric_name, &observation.labels, observation.value)
            }
        }
    }
}

impl<T: MetricSink + ?Sized> MetricSink for Arc<T> {
    fn set_gauge(&self, name: &str, labels: &LabelSet, value: f64) -> Result<()> {
        (**self).set_gauge(name, labels, value)
    }

    fn increment_counter(&self, name: &str, labels: &LabelSet, delta: f64) -> Result<()> {
        (**self).increment_counter(name, labels, delta)
    }

    fn remove_series(&self, name: &str, labels: &LabelSet) -> Result<()> {
        (**self).remove_series(name, labels)
    }
}

/// Resolve a metric and order label values by its declared label names
pub(crate) fn resolve<'a>(
    name: &str,
    labels: &'a LabelSet,
    expected: MetricKind,
) -> Result<(&'static MetricDescriptor, Vec<&'a str>)> {
    let desc = descriptor(name).ok_or_else(|| ExporterError::Sink(format!("unknown metric {}", name)))?;
    if desc.kind != expected {
        return Err(ExporterError::Sink(format!(
            "{} is a {:?}, not a {:?}",
            name, desc.kind, expected
        )));
    }
    if labels.len() != desc.labels.len() {
        return Err(label_mismatch(desc, labels));
    }
    let values = desc
        .labels
        .iter()
        .map(|key| labels.get(key).ok_or_else(|| label_mismatch(desc, labels)))
        .collect::<Result<Vec<_>>>()?;
    Ok((desc, values))
}

fn label_mismatch(desc: &MetricDescriptor, labels: &LabelSet) -> ExporterError {
    ExporterError::Sink(format!(
        "{} expects labels {:?}, got {}",
        desc.name, desc.labels, labels
    ))
}

pub(crate) fn check_delta(name: &str, delta: f64) -> Result<()> {
    if delta < 0.0 || !delta.is_finite() {
        return Err(ExporterError::Sink(format!(
            "counter {} cannot change by {}",
            name, delta
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::metrics::{COLLECTION_CYCLES, TOTAL_SPEND, USER_SPEND};

    #[test]
    fn test_resolve_orders_values_by_declaration() {
        let labels = LabelSet::new()
            .with("user_alias", "alice")
            .with("user_id", "u1")
            .with("model", "gpt-4");
        let (_, values) = resolve(USER_SPEND, &labels, MetricKind::Gauge).unwrap();
        assert_eq!(values, vec!["gpt-4", "u1", "alice"]);
    }

    #[test]
    fn test_resolve_rejects_mismatches() {
        let model = LabelSet::new().with("model", "gpt-4");
        assert!(resolve("litellm_unknown", &model, MetricKind::Gauge).is_err());
        assert!(resolve(TOTAL_SPEND, &model, MetricKind::Counter).is_err());
        assert!(resolve(TOTAL_SPEND, &LabelSet::new(), MetricKind::Gauge).is_err());
        assert!(resolve(TOTAL_SPEND, &LabelSet::new().with("modle", "x"), MetricKind::Gauge).is_err());
        assert!(resolve(COLLECTION_CYCLES, &LabelSet::new(), MetricKind::Counter).is_ok());
    }
}
