//! In-memory sink for tests and benchmarks

use dashmap::DashMap;
use litellm_exporter_common::{LabelSet, MetricKind, Result};

use super::{check_delta, resolve, MetricSink};
use crate::catalog::metrics::descriptor;

/// Keeps the latest value of every series in a concurrent map
#[derive(Debug, Default)]
pub struct InMemorySink {
    series: DashMap<(&'static str, LabelSet), f64>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str, labels: &LabelSet) -> Option<f64> {
        let desc = descriptor(name)?;
        self.series.get(&(desc.name, labels.clone())).map(|v| *v)
    }

    /// Every series of one metric, sorted by labels
    pub fn series(&self, name: &str) -> Vec<(LabelSet, f64)> {
        let mut out: Vec<_> = self
            .series
            .iter()
            .filter(|entry| entry.key().0 == name)
            .map(|entry| (entry.key().1.clone(), *entry.value()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Total number of live series
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

impl MetricSink for InMemorySink {
    fn set_gauge(&self, name: &str, labels: &LabelSet, value: f64) -> Result<()> {
        let (desc, _) = resolve(name, labels, MetricKind::Gauge)?;
        self.series.insert((desc.name, labels.clone()), value);
        Ok(())
    }

    fn increment_counter(&self, name: &str, labels: &LabelSet, delta: f64) -> Result<()> {
        check_delta(name, delta)?;
        let (desc, _) = resolve(name, labels, MetricKind::Counter)?;
        *self.series.entry((desc.name, labels.clone())).or_insert(0.0) += delta;
        Ok(())
    }

    fn remove_series(&self, name: &str, labels: &LabelSet) -> Result<()> {
        if let Some(desc) = descriptor(name) {
            self.series.remove(&(desc.name, labels.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::metrics::{QUERY_FAILURES, TOTAL_SPEND};

    #[test]
    fn test_gauge_set_and_remove() {
        let sink = InMemorySink::new();
        let labels = LabelSet::new().with("model", "gpt-4");

        sink.set_gauge(TOTAL_SPEND, &labels, 1.5).unwrap();
        sink.set_gauge(TOTAL_SPEND, &labels, 2.5).unwrap();
        assert_eq!(sink.get(TOTAL_SPEND, &labels), Some(2.5));

        sink.remove_series(TOTAL_SPEND, &labels).unwrap();
        assert_eq!(sink.get(TOTAL_SPEND, &labels), None);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_counter_accumulates() {
        let sink = InMemorySink::new();
        let labels = LabelSet::new().with("family", "budgets");

        sink.increment_counter(QUERY_FAILURES, &labels, 1.0).unwrap();
        sink.increment_counter(QUERY_FAILURES, &labels, 2.0).unwrap();
        assert_eq!(sink.get(QUERY_FAILURES, &labels), Some(3.0));
        assert!(sink.set_gauge(QUERY_FAILURES, &labels, 0.0).is_err());
    }
}
