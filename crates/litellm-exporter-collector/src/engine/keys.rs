//! Virtual key metrics
//!
//! Three families: the key records themselves, 30-day spend recomputed from
//! the logs, and key budgets. Recorded and recomputed spend are published
//! side by side and never reconciled against each other.

use std::time::Duration;

use litellm_exporter_common::{MetricObservation, KEY_SPEND_WINDOW_SECS};

use super::series::{alias_label, epoch_seconds, key_labels, SeriesSet};
use crate::catalog::metrics::{
    KEY_BLOCKED_STATUS, KEY_BUDGET, KEY_BUDGET_RESET_AT, KEY_BUDGET_SPEND, KEY_EXPIRES_AT, KEY_INFO, KEY_SPEND,
    KEY_SPEND_30D,
};
use crate::catalog::queries::{window_param, KEYS, KEY_BUDGETS, KEY_SPEND as KEY_SPEND_QUERY};
use crate::catalog::rows::{decode_all, KeyBudgetRow, KeyRow, KeySpendRow};
use crate::db::{QueryError, QueryExecutor};

pub const SPEND_WINDOW: Duration = Duration::from_secs(KEY_SPEND_WINDOW_SECS);

pub async fn collect_keys<E: QueryExecutor + ?Sized>(executor: &E) -> Result<Vec<MetricObservation>, QueryError> {
    let rows = executor.execute(&KEYS, &[]).await?;
    Ok(key_observations(&decode_all::<KeyRow>(&rows)?))
}

pub async fn collect_key_spend<E: QueryExecutor + ?Sized>(
    executor: &E,
) -> Result<Vec<MetricObservation>, QueryError> {
    let rows = executor
        .execute(&KEY_SPEND_QUERY, &window_param(SPEND_WINDOW.as_secs_f64()))
        .await?;
    Ok(key_spend_observations(&decode_all::<KeySpendRow>(&rows)?))
}

pub async fn collect_key_budgets<E: QueryExecutor + ?Sized>(
    executor: &E,
) -> Result<Vec<MetricObservation>, QueryError> {
    let rows = executor.execute(&KEY_BUDGETS, &[]).await?;
    Ok(key_budget_observations(&decode_all::<KeyBudgetRow>(&rows)?))
}

/// Keys sharing a name and alias collapse into one series, last row wins
pub fn key_observations(rows: &[KeyRow]) -> Vec<MetricObservation> {
    let mut series = SeriesSet::new();

    for row in rows {
        let labels = key_labels(row.key_name.as_deref(), row.key_alias.as_deref());

        series.set(KEY_SPEND, labels.clone(), row.spend);
        series.set(KEY_BLOCKED_STATUS, labels.clone(), if row.blocked { 1.0 } else { 0.0 });
        if let Some(expires) = row.expires {
            series.set(KEY_EXPIRES_AT, labels.clone(), epoch_seconds(expires));
        }
        series.set(
            KEY_INFO,
            labels
                .with("user_id", alias_label(row.user_id.as_deref()))
                .with("team_id", alias_label(row.team_id.as_deref())),
            1.0,
        );
    }

    series.into_observations()
}

pub fn key_spend_observations(rows: &[KeySpendRow]) -> Vec<MetricObservation> {
    let mut series = SeriesSet::new();
    for row in rows {
        series.add(
            KEY_SPEND_30D,
            key_labels(row.key_name.as_deref(), row.key_alias.as_deref()),
            row.total_spend,
        );
    }
    series.into_observations()
}

pub fn key_budget_observations(rows: &[KeyBudgetRow]) -> Vec<MetricObservation> {
    let mut series = SeriesSet::new();

    for row in rows {
        let labels = key_labels(row.key_name.as_deref(), row.key_alias.as_deref());

        if let Some(max) = row.max_budget() {
            series.set(KEY_BUDGET, labels.clone(), max);
        }
        if let Some(reset_at) = row.budget_reset_at() {
            series.set(KEY_BUDGET_RESET_AT, labels.clone(), epoch_seconds(reset_at));
        }
        series.set(KEY_BUDGET_SPEND, labels, row.current_spend);
    }

    series.into_observations()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use litellm_exporter_common::LabelSet;

    fn key(name: Option<&str>, spend: f64) -> KeyRow {
        KeyRow {
            token: Some("hashed".into()),
            key_name: name.map(String::from),
            key_alias: None,
            expires: None,
            user_id: Some("u1".into()),
            team_id: None,
            blocked: false,
            spend,
        }
    }

    #[test]
    fn test_key_record_metrics() {
        let mut row = key(Some("sk-...abcd"), 12.0);
        row.expires = Some(Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap());
        row.blocked = true;

        let obs = key_observations(&[row]);
        let get = |metric: &str| obs.iter().find(|o| o.metric_name == metric);

        assert_eq!(get(KEY_SPEND).map(|o| o.value), Some(12.0));
        assert_eq!(get(KEY_BLOCKED_STATUS).map(|o| o.value), Some(1.0));
        assert!(get(KEY_EXPIRES_AT).is_some());

        let info = get(KEY_INFO).unwrap();
        assert_eq!(info.labels.get("user_id"), Some("u1"));
        assert_eq!(info.labels.get("team_id"), Some("none"));
        assert_eq!(info.labels.get("key_alias"), Some("none"));
    }

    #[test]
    fn test_orphan_log_spend_labelled_none() {
        let obs = key_spend_observations(&[KeySpendRow {
            key_name: None,
            key_alias: None,
            total_spend: 3.5,
        }]);
        assert_eq!(obs.len(), 1);
        assert_eq!(
            obs[0].labels,
            LabelSet::new().with("key_name", "none").with("key_alias", "none")
        );
        assert_eq!(obs[0].value, 3.5);
    }

    #[test]
    fn test_key_budget_falls_back_to_linked_budget() {
        let obs = key_budget_observations(&[KeyBudgetRow {
            token: Some("hashed".into()),
            key_name: Some("sk-...abcd".into()),
            key_alias: Some("ci".into()),
            key_max_budget: None,
            linked_max_budget: Some(50.0),
            key_budget_reset_at: None,
            linked_budget_reset_at: None,
            current_spend: 7.0,
        }]);

        let get = |metric: &str| obs.iter().find(|o| o.metric_name == metric).map(|o| o.value);
        assert_eq!(get(KEY_BUDGET), Some(50.0));
        assert_eq!(get(KEY_BUDGET_SPEND), Some(7.0));
        assert_eq!(get(KEY_BUDGET_RESET_AT), None);
    }
}
