//! Budget metrics for users, teams and organizations
//!
//! Runs one query per entity kind. Any failing branch fails the family, so
//! a half-updated budget view is never published.

use litellm_exporter_common::{EntityKind, MetricObservation};
use tracing::debug;

use super::series::{entity_labels, epoch_seconds, latest_by_id, SeriesSet};
use crate::catalog::metrics::{BUDGET_CURRENT_SPEND, BUDGET_RESET_AT, BUDGET_UTILIZATION, MAX_BUDGET, SOFT_BUDGET};
use crate::catalog::queries::budgets;
use crate::catalog::rows::{decode_all, BudgetRow};
use crate::catalog::ENTITY_BINDINGS;
use crate::db::{QueryError, QueryExecutor};

pub async fn collect<E: QueryExecutor + ?Sized>(executor: &E) -> Result<Vec<MetricObservation>, QueryError> {
    let mut groups = Vec::with_capacity(ENTITY_BINDINGS.len());
    for binding in &ENTITY_BINDINGS {
        let rows = executor.execute(&budgets(binding), &[]).await?;
        let rows = decode_all::<BudgetRow>(&rows)?;
        debug!(kind = %binding.kind, rows = rows.len(), "Budget rows");
        groups.push((binding.kind, rows));
    }
    Ok(observations(&groups))
}

pub fn observations(groups: &[(EntityKind, Vec<BudgetRow>)]) -> Vec<MetricObservation> {
    let mut series = SeriesSet::new();

    for (kind, rows) in groups {
        for (id, row) in latest_by_id(rows, |row| row.entity_id.as_deref()) {
            let labels = entity_labels(*kind, id, row.entity_alias.as_deref());

            if let Some(max) = row.max_budget {
                series.set(MAX_BUDGET, labels.clone(), max);
            }
            if let Some(soft) = row.soft_budget {
                series.set(SOFT_BUDGET, labels.clone(), soft);
            }
            if let Some(reset_at) = row.budget_reset_at {
                series.set(BUDGET_RESET_AT, labels.clone(), epoch_seconds(reset_at));
            }
            if let Some(spend) = row.current_spend {
                series.set(BUDGET_CURRENT_SPEND, labels.clone(), spend);
            }
            if let Some(utilization) = row.utilization() {
                series.set(BUDGET_UTILIZATION, labels, utilization);
            }
        }
    }

    series.into_observations()
}
