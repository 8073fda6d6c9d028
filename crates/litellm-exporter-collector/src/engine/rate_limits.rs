//! Rate limits and blocked status for users and teams

use litellm_exporter_common::{EntityKind, MetricObservation};

use super::series::{entity_labels, latest_by_id, SeriesSet};
use crate::catalog::metrics::{BLOCKED_STATUS, PARALLEL_REQUESTS, RPM_LIMIT, TPM_LIMIT};
use crate::catalog::queries::{RATE_LIMITS_TEAM, RATE_LIMITS_USER};
use crate::catalog::rows::{decode_all, RateLimitRow};
use crate::db::{QueryError, QueryExecutor};

pub async fn collect<E: QueryExecutor + ?Sized>(executor: &E) -> Result<Vec<MetricObservation>, QueryError> {
    let users = executor.execute(&RATE_LIMITS_USER, &[]).await?;
    let teams = executor.execute(&RATE_LIMITS_TEAM, &[]).await?;
    Ok(observations(&[
        (EntityKind::User, decode_all::<RateLimitRow>(&users)?),
        (EntityKind::Team, decode_all::<RateLimitRow>(&teams)?),
    ]))
}

/// Later rows for the same entity overwrite earlier ones
pub fn observations(groups: &[(EntityKind, Vec<RateLimitRow>)]) -> Vec<MetricObservation> {
    let mut series = SeriesSet::new();

    for (kind, rows) in groups {
        for (id, row) in latest_by_id(rows, |row| row.entity_id.as_deref()) {
            let labels = entity_labels(*kind, id, row.entity_alias.as_deref());

            if let Some(tpm) = row.tpm_limit {
                series.set(TPM_LIMIT, labels.clone(), tpm);
            }
            if let Some(rpm) = row.rpm_limit {
                series.set(RPM_LIMIT, labels.clone(), rpm);
            }
            if let Some(parallel) = row.max_parallel_requests {
                series.set(PARALLEL_REQUESTS, labels.clone(), parallel);
            }
            series.set(BLOCKED_STATUS, labels, if row.blocked { 1.0 } else { 0.0 });
        }
    }

    series.into_observations()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(id: &str, tpm: Option<f64>, blocked: bool) -> RateLimitRow {
        RateLimitRow {
            entity_id: Some(id.to_string()),
            entity_alias: None,
            tpm_limit: tpm,
            rpm_limit: None,
            max_parallel_requests: None,
            blocked,
        }
    }

    #[test]
    fn test_blocked_always_published() {
        let obs = observations(&[(EntityKind::Team, vec![limits("t1", Some(1000.0), false)])]);
        let blocked: Vec<_> = obs.iter().filter(|o| o.metric_name == BLOCKED_STATUS).collect();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].value, 0.0);
        assert!(obs.iter().all(|o| o.metric_name != RPM_LIMIT));
    }

    #[test]
    fn test_last_row_wins_per_entity() {
        let obs = observations(&[(
            EntityKind::User,
            vec![limits("u1", Some(10.0), false), limits("u1", Some(20.0), true)],
        )]);
        let tpm: Vec<_> = obs.iter().filter(|o| o.metric_name == TPM_LIMIT).collect();
        assert_eq!(tpm.len(), 1);
        assert_eq!(tpm[0].value, 20.0);
        assert!(obs.iter().any(|o| o.metric_name == BLOCKED_STATUS && o.value == 1.0));
    }

    #[test]
    fn test_alias_change_does_not_split_entity() {
        let mut first = limits("u1", Some(10.0), false);
        first.entity_alias = Some("alice".into());
        let mut second = limits("u1", Some(20.0), false);
        second.entity_alias = Some("alice-renamed".into());

        let obs = observations(&[(EntityKind::User, vec![first, second])]);
        let blocked: Vec<_> = obs.iter().filter(|o| o.metric_name == BLOCKED_STATUS).collect();
        assert_eq!(blocked.len(), 1);
        assert!(obs.iter().all(|o| o.labels.get("entity_alias") == Some("alice-renamed")));
    }

    #[test]
    fn test_same_id_different_kind_kept_apart() {
        let obs = observations(&[
            (EntityKind::User, vec![limits("x", Some(1.0), false)]),
            (EntityKind::Team, vec![limits("x", Some(2.0), false)]),
        ]);
        assert_eq!(obs.iter().filter(|o| o.metric_name == TPM_LIMIT).count(), 2);
    }
}
