//! Spend, token, request and cache metrics over the spend window

use litellm_exporter_common::{LabelSet, MetricObservation, TimeWindow};

use super::series::{alias_label, model_label, SeriesSet};
use crate::catalog::metrics::*;
use crate::catalog::queries::{window_param, SPEND};
use crate::catalog::rows::{decode_all, CacheOutcome, SpendRow};
use crate::db::{QueryError, QueryExecutor};

pub async fn collect<E: QueryExecutor + ?Sized>(
    executor: &E,
    window: &TimeWindow,
) -> Result<Vec<MetricObservation>, QueryError> {
    let rows = executor.execute(&SPEND, &window_param(window.as_secs_f64())).await?;
    Ok(observations(&decode_all::<SpendRow>(&rows)?))
}

/// Model totals are summed over every group sharing the model; entity
/// spend is summed per (model, entity).
pub fn observations(rows: &[SpendRow]) -> Vec<MetricObservation> {
    let mut series = SeriesSet::new();

    for row in rows {
        let model = model_label(row.model.as_deref());
        let by_model = LabelSet::new().with("model", model);

        let (hits, misses) = match row.cache {
            CacheOutcome::Hit => (row.request_count, 0.0),
            CacheOutcome::Miss => (0.0, row.request_count),
            CacheOutcome::Unknown => (0.0, 0.0),
        };

        series.add(TOTAL_SPEND, by_model.clone(), row.total_spend);
        series.add(TOTAL_TOKENS, by_model.clone(), row.total_tokens);
        series.add(PROMPT_TOKENS, by_model.clone(), row.prompt_tokens);
        series.add(COMPLETION_TOKENS, by_model.clone(), row.completion_tokens);
        series.add(REQUESTS_TOTAL, by_model.clone(), row.request_count);
        series.add(CACHE_HITS, by_model.clone(), hits);
        series.add(CACHE_MISSES, by_model, misses);

        if let Some(user_id) = row.user_id.as_deref() {
            series.add(
                USER_SPEND,
                LabelSet::new()
                    .with("model", model)
                    .with("user_id", user_id)
                    .with("user_alias", alias_label(row.user_alias.as_deref())),
                row.total_spend,
            );
        }
        if let Some(team_id) = row.team_id.as_deref() {
            series.add(
                TEAM_SPEND,
                LabelSet::new()
                    .with("model", model)
                    .with("team_id", team_id)
                    .with("team_alias", alias_label(row.team_alias.as_deref())),
                row.total_spend,
            );
        }
        if let Some(org_id) = row.organization_id.as_deref() {
            series.add(
                ORG_SPEND,
                LabelSet::new()
                    .with("model", model)
                    .with("organization_id", org_id)
                    .with("organization_alias", alias_label(row.organization_alias.as_deref())),
                row.total_spend,
            );
        }
    }

    series.into_observations()
}
