//! Token and request throughput over the trailing minute

use std::time::Duration;

use litellm_exporter_common::{EntityKind, LabelSet, MetricObservation, CURRENT_RATE_WINDOW_SECS};

use super::series::{alias_label, model_label, SeriesSet};
use crate::catalog::metrics::{CURRENT_RPM, CURRENT_TPM};
use crate::catalog::queries::{current_rates, window_param};
use crate::catalog::rows::{decode_all, CurrentRateRow};
use crate::catalog::ENTITY_BINDINGS;
use crate::db::{QueryError, QueryExecutor};

pub const WINDOW: Duration = Duration::from_secs(CURRENT_RATE_WINDOW_SECS);

pub async fn collect<E: QueryExecutor + ?Sized>(executor: &E) -> Result<Vec<MetricObservation>, QueryError> {
    let params = window_param(WINDOW.as_secs_f64());
    let mut groups = Vec::with_capacity(ENTITY_BINDINGS.len());
    for binding in &ENTITY_BINDINGS {
        let rows = executor.execute(&current_rates(binding), &params).await?;
        groups.push((binding.kind, decode_all::<CurrentRateRow>(&rows)?));
    }
    Ok(observations(&groups))
}

pub fn observations(groups: &[(EntityKind, Vec<CurrentRateRow>)]) -> Vec<MetricObservation> {
    let mut series = SeriesSet::new();

    for (kind, rows) in groups {
        for row in rows {
            let Some(id) = row.entity_id.as_deref() else {
                continue;
            };
            let labels = LabelSet::new()
                .with("model", model_label(row.model.as_deref()))
                .with("entity_type", kind.as_str())
                .with("entity_id", id)
                .with("entity_alias", alias_label(row.entity_alias.as_deref()));

            series.add(CURRENT_TPM, labels.clone(), row.total_tokens);
            series.add(CURRENT_RPM, labels, row.request_count);
        }
    }

    series.into_observations()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate(model: Option<&str>, id: &str, tokens: f64, requests: f64) -> CurrentRateRow {
        CurrentRateRow {
            model: model.map(String::from),
            entity_id: Some(id.to_string()),
            entity_alias: None,
            total_tokens: tokens,
            request_count: requests,
        }
    }

    #[test]
    fn test_each_kind_labelled() {
        let obs = observations(&[
            (EntityKind::User, vec![rate(Some("gpt-4"), "u1", 500.0, 3.0)]),
            (EntityKind::Organization, vec![rate(None, "o1", 100.0, 1.0)]),
        ]);
        assert_eq!(obs.len(), 4);

        let org_tpm = obs
            .iter()
            .find(|o| o.metric_name == CURRENT_TPM && o.labels.get("entity_type") == Some("organization"))
            .unwrap();
        assert_eq!(org_tpm.value, 100.0);
        assert_eq!(org_tpm.labels.get("model"), Some("unknown"));
        assert_eq!(org_tpm.labels.get("entity_alias"), Some("none"));
    }

    #[test]
    fn test_null_entity_skipped() {
        let mut row = rate(Some("gpt-4"), "u1", 1.0, 1.0);
        row.entity_id = None;
        assert!(observations(&[(EntityKind::Team, vec![row])]).is_empty());
    }
}
