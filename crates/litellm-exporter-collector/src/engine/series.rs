//! Series accumulation and label helpers shared by the family collectors

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use litellm_exporter_common::{EntityKind, LabelSet, MetricObservation, NO_ALIAS, UNKNOWN_MODEL};

/// Gauge values for one family, keyed by metric and label set
///
/// Output order is fixed by the keys, so the same rows always yield the
/// same observation sequence.
#[derive(Debug, Default)]
pub struct SeriesSet {
    values: BTreeMap<(&'static str, LabelSet), f64>,
}

impl SeriesSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a series; the last write in a cycle wins
    pub fn set(&mut self, metric: &'static str, labels: LabelSet, value: f64) {
        self.values.insert((metric, labels), value);
    }

    /// Add to a series, starting from zero
    pub fn add(&mut self, metric: &'static str, labels: LabelSet, value: f64) {
        *self.values.entry((metric, labels)).or_insert(0.0) += value;
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_observations(self) -> Vec<MetricObservation> {
        self.values
            .into_iter()
            .map(|((metric, labels), value)| MetricObservation::gauge(metric, labels, value))
            .collect()
    }
}

pub fn model_label(model: Option<&str>) -> &str {
    model.unwrap_or(UNKNOWN_MODEL)
}

pub fn alias_label(alias: Option<&str>) -> &str {
    alias.unwrap_or(NO_ALIAS)
}

/// Last row per entity id, in id order
///
/// Rows without an id are skipped. A later row replaces an earlier one
/// whole, alias included, so an entity never splits across aliases.
pub fn latest_by_id<'a, R>(rows: &'a [R], id: impl Fn(&'a R) -> Option<&'a str>) -> BTreeMap<&'a str, &'a R> {
    let mut latest = BTreeMap::new();
    for row in rows {
        if let Some(id) = id(row) {
            latest.insert(id, row);
        }
    }
    latest
}

/// `entity_type`, `entity_id`, `entity_alias`
pub fn entity_labels(kind: EntityKind, id: &str, alias: Option<&str>) -> LabelSet {
    LabelSet::new()
        .with("entity_type", kind.as_str())
        .with("entity_id", id)
        .with("entity_alias", alias_label(alias))
}

/// `key_name`, `key_alias`
pub fn key_labels(name: Option<&str>, alias: Option<&str>) -> LabelSet {
    LabelSet::new()
        .with("key_name", alias_label(name))
        .with("key_alias", alias_label(alias))
}

/// Unix time in seconds, with sub-second precision
pub fn epoch_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_set_overwrites_add_accumulates() {
        let mut series = SeriesSet::new();
        let labels = LabelSet::new().with("model", "gpt-4");

        series.set("litellm_total_spend", labels.clone(), 1.0);
        series.set("litellm_total_spend", labels.clone(), 2.0);
        series.add("litellm_requests_total", labels.clone(), 3.0);
        series.add("litellm_requests_total", labels, 4.0);

        let out = series.into_observations();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].metric_name, "litellm_requests_total");
        assert_eq!(out[0].value, 7.0);
        assert_eq!(out[1].value, 2.0);
    }

    #[test]
    fn test_placeholder_labels() {
        assert_eq!(model_label(None), "unknown");
        let labels = key_labels(None, Some("ci"));
        assert_eq!(labels.get("key_name"), Some("none"));
        assert_eq!(labels.get("key_alias"), Some("ci"));
        assert_eq!(
            entity_labels(EntityKind::Organization, "o1", None).get("entity_type"),
            Some("organization")
        );
    }

    #[test]
    fn test_latest_by_id_keeps_last_row() {
        let rows = [(Some("u1"), 1), (None, 2), (Some("u2"), 3), (Some("u1"), 4)];
        let latest = latest_by_id(&rows, |row| row.0);

        assert_eq!(latest.len(), 2);
        assert_eq!(latest["u1"].1, 4);
        assert_eq!(latest["u2"].1, 3);
    }

    #[test]
    fn test_epoch_seconds() {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(epoch_seconds(at), 1_767_225_600.0);
    }
}
