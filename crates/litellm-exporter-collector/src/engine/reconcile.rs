//! Reconciliation of published label sets across cycles
//!
//! Tracks, per query family and metric, which label sets the last
//! successful publication wrote. A series missing from the next
//! publication is stale and must be removed or zeroed.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::str::FromStr;

use litellm_exporter_common::{LabelSet, MetricKind, MetricObservation};
use serde::{Deserialize, Serialize};

use crate::catalog::QueryFamily;

/// What happens to a series that dropped out of its family's results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaleSeries {
    /// Delete the series from the exposition
    #[default]
    Remove,
    /// Publish 0 once, then stop tracking it
    Zero,
}

impl FromStr for StaleSeries {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "remove" => Ok(StaleSeries::Remove),
            "zero" => Ok(StaleSeries::Zero),
            other => Err(format!("unknown stale series policy: {}", other)),
        }
    }
}

/// A series that must be retired
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct StaleEntry {
    pub metric: &'static str,
    pub labels: LabelSet,
}

type Published = BTreeMap<&'static str, BTreeSet<LabelSet>>;

/// Per-family record of the last published label sets
#[derive(Debug, Default)]
pub struct Reconciler {
    published: HashMap<QueryFamily, Published>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a publication and return the series it made stale
    ///
    /// Only gauges are tracked; counters keep their value for the life of
    /// the process. Stale entries come back sorted.
    pub fn reconcile(&mut self, family: QueryFamily, observations: &[MetricObservation]) -> Vec<StaleEntry> {
        let mut current: Published = BTreeMap::new();
        for obs in observations.iter().filter(|o| o.kind == MetricKind::Gauge) {
            current.entry(obs.metric_name).or_default().insert(obs.labels.clone());
        }

        let previous = self.published.insert(family, current).unwrap_or_default();
        let current = &self.published[&family];

        let mut stale = Vec::new();
        for (metric, label_sets) in previous {
            let still_published = current.get(metric);
            for labels in label_sets {
                if !still_published.is_some_and(|set| set.contains(&labels)) {
                    stale.push(StaleEntry { metric, labels });
                }
            }
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spend(user: &str, value: f64) -> MetricObservation {
        MetricObservation::gauge(
            "litellm_user_spend",
            LabelSet::new()
                .with("model", "gpt-4")
                .with("user_id", user)
                .with("user_alias", "none"),
            value,
        )
    }

    #[test]
    fn test_absent_entity_becomes_stale() {
        let mut reconciler = Reconciler::new();

        let first = reconciler.reconcile(QueryFamily::Spend, &[spend("u1", 1.0), spend("u2", 2.0)]);
        assert!(first.is_empty());

        let second = reconciler.reconcile(QueryFamily::Spend, &[spend("u2", 3.0)]);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].labels.get("user_id"), Some("u1"));

        // stale series are forgotten once retired
        assert!(reconciler.reconcile(QueryFamily::Spend, &[spend("u2", 3.0)]).is_empty());
    }

    #[test]
    fn test_families_are_tracked_separately() {
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(QueryFamily::Spend, &[spend("u1", 1.0)]);

        assert!(reconciler.reconcile(QueryFamily::Budgets, &[]).is_empty());

        let stale = reconciler.reconcile(QueryFamily::Spend, &[]);
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].labels.get("user_id"), Some("u1"));
    }

    #[test]
    fn test_counters_never_stale() {
        let mut reconciler = Reconciler::new();
        let counter = MetricObservation::counter(
            "litellm_exporter_query_failures_total",
            LabelSet::new().with("family", "spend"),
            1.0,
        );
        reconciler.reconcile(QueryFamily::Spend, &[counter]);
        assert!(reconciler.reconcile(QueryFamily::Spend, &[]).is_empty());
    }

    #[test]
    fn test_policy_parses() {
        assert_eq!("zero".parse::<StaleSeries>().unwrap(), StaleSeries::Zero);
        assert_eq!("Remove".parse::<StaleSeries>().unwrap(), StaleSeries::Remove);
        assert!("keep".parse::<StaleSeries>().is_err());
    }
}
