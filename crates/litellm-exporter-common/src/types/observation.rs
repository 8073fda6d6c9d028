//! Metric observations produced by the aggregation engine

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a published value combines with the previous one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Replaced wholesale on every publication
    Gauge,
    /// Only ever incremented over the process lifetime
    Counter,
}

/// Label set with deterministic key order
///
/// Backed by a `BTreeMap`, so two label sets built from the same pairs in
/// any order compare, hash and iterate identically across cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a label
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl std::fmt::Display for LabelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={:?}", k, v)?;
        }
        f.write_str("}")
    }
}

/// One value for one labelled series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricObservation {
    /// Metric family name, e.g. `litellm_total_spend`
    pub metric_name: &'static str,
    pub labels: LabelSet,
    pub value: f64,
    pub kind: MetricKind,
}

impl MetricObservation {
    pub fn gauge(metric_name: &'static str, labels: LabelSet, value: f64) -> Self {
        Self {
            metric_name,
            labels,
            value,
            kind: MetricKind::Gauge,
        }
    }

    pub fn counter(metric_name: &'static str, labels: LabelSet, delta: f64) -> Self {
        Self {
            metric_name,
            labels,
            value: delta,
            kind: MetricKind::Counter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_order_is_deterministic() {
        let a = LabelSet::new().with("model", "gpt-4").with("entity_id", "u1");
        let b: LabelSet = [("entity_id", "u1"), ("model", "gpt-4")].into_iter().collect();

        assert_eq!(a, b);
        assert_eq!(a.to_string(), b.to_string());
        assert_eq!(a.to_string(), r#"{entity_id="u1",model="gpt-4"}"#);
    }

    #[test]
    fn test_observation_constructors() {
        let labels = LabelSet::new().with("model", "gpt-4");
        let gauge = MetricObservation::gauge("litellm_total_spend", labels.clone(), 0.05);
        let counter = MetricObservation::counter("litellm_exporter_collection_cycles_total", labels, 1.0);

        assert_eq!(gauge.kind, MetricKind::Gauge);
        assert_eq!(counter.kind, MetricKind::Counter);
        assert_eq!(gauge.labels.get("model"), Some("gpt-4"));
    }
}
