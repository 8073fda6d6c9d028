//! Metric families published by the exporter
//!
//! Every family is declared up front with help text and a fixed label
//! order; sinks register from this table and reject anything else.

use litellm_exporter_common::MetricKind;

use super::QueryFamily;

// Spend
pub const TOTAL_SPEND: &str = "litellm_total_spend";
pub const TOTAL_TOKENS: &str = "litellm_total_tokens";
pub const PROMPT_TOKENS: &str = "litellm_prompt_tokens";
pub const COMPLETION_TOKENS: &str = "litellm_completion_tokens";
pub const REQUESTS_TOTAL: &str = "litellm_requests_total";
pub const CACHE_HITS: &str = "litellm_cache_hits_total";
pub const CACHE_MISSES: &str = "litellm_cache_misses_total";
pub const USER_SPEND: &str = "litellm_user_spend";
pub const TEAM_SPEND: &str = "litellm_team_spend";
pub const ORG_SPEND: &str = "litellm_org_spend";

// Rate limits
pub const TPM_LIMIT: &str = "litellm_tpm_limit";
pub const RPM_LIMIT: &str = "litellm_rpm_limit";
pub const PARALLEL_REQUESTS: &str = "litellm_parallel_requests";
pub const BLOCKED_STATUS: &str = "litellm_blocked_status";

// Budgets
pub const MAX_BUDGET: &str = "litellm_max_budget";
pub const SOFT_BUDGET: &str = "litellm_soft_budget";
pub const BUDGET_RESET_AT: &str = "litellm_budget_reset_at";
pub const BUDGET_CURRENT_SPEND: &str = "litellm_budget_current_spend";
pub const BUDGET_UTILIZATION: &str = "litellm_budget_utilization";

// Keys
pub const KEY_SPEND: &str = "litellm_key_spend";
pub const KEY_EXPIRES_AT: &str = "litellm_key_expires_at";
pub const KEY_BLOCKED_STATUS: &str = "litellm_key_blocked_status";
pub const KEY_INFO: &str = "litellm_key_info";
pub const KEY_SPEND_30D: &str = "litellm_key_spend_30d";
pub const KEY_BUDGET: &str = "litellm_key_budget";
pub const KEY_BUDGET_SPEND: &str = "litellm_key_budget_spend";
pub const KEY_BUDGET_RESET_AT: &str = "litellm_key_budget_reset_at";

// Current rates
pub const CURRENT_TPM: &str = "litellm_current_tpm";
pub const CURRENT_RPM: &str = "litellm_current_rpm";

// Exporter
pub const COLLECTION_CYCLES: &str = "litellm_exporter_collection_cycles_total";
pub const QUERY_FAILURES: &str = "litellm_exporter_query_failures_total";
pub const LAST_SUCCESS: &str = "litellm_exporter_last_success_timestamp_seconds";
pub const CYCLE_DURATION: &str = "litellm_exporter_cycle_duration_seconds";
pub const SCHEMA_READY: &str = "litellm_exporter_schema_ready";
pub const WINDOW_SECONDS: &str = "litellm_exporter_window_seconds";

const MODEL: &[&str] = &["model"];
const ENTITY: &[&str] = &["entity_type", "entity_id", "entity_alias"];
const MODEL_ENTITY: &[&str] = &["model", "entity_type", "entity_id", "entity_alias"];
const KEY: &[&str] = &["key_name", "key_alias"];

/// Static description of one metric family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricDescriptor {
    pub name: &'static str,
    pub help: &'static str,
    /// Label names in registration order
    pub labels: &'static [&'static str],
    pub kind: MetricKind,
    /// Owning query family, `None` for exporter self-metrics
    pub family: Option<QueryFamily>,
}

const fn gauge(
    name: &'static str,
    help: &'static str,
    labels: &'static [&'static str],
    family: QueryFamily,
) -> MetricDescriptor {
    MetricDescriptor {
        name,
        help,
        labels,
        kind: MetricKind::Gauge,
        family: Some(family),
    }
}

const fn exporter(
    name: &'static str,
    help: &'static str,
    labels: &'static [&'static str],
    kind: MetricKind,
) -> MetricDescriptor {
    MetricDescriptor {
        name,
        help,
        labels,
        kind,
        family: None,
    }
}

pub const METRICS: &[MetricDescriptor] = &[
    gauge(TOTAL_SPEND, "Spend across all users in the spend window", MODEL, QueryFamily::Spend),
    gauge(TOTAL_TOKENS, "Tokens used in the spend window", MODEL, QueryFamily::Spend),
    gauge(PROMPT_TOKENS, "Prompt tokens used in the spend window", MODEL, QueryFamily::Spend),
    gauge(COMPLETION_TOKENS, "Completion tokens used in the spend window", MODEL, QueryFamily::Spend),
    gauge(REQUESTS_TOTAL, "Requests in the spend window", MODEL, QueryFamily::Spend),
    gauge(CACHE_HITS, "Cache hits in the spend window", MODEL, QueryFamily::Spend),
    gauge(CACHE_MISSES, "Cache misses in the spend window", MODEL, QueryFamily::Spend),
    gauge(
        USER_SPEND,
        "Spend by user",
        &["model", "user_id", "user_alias"],
        QueryFamily::Spend,
    ),
    gauge(
        TEAM_SPEND,
        "Spend by team",
        &["model", "team_id", "team_alias"],
        QueryFamily::Spend,
    ),
    gauge(
        ORG_SPEND,
        "Spend by organization",
        &["model", "organization_id", "organization_alias"],
        QueryFamily::Spend,
    ),
    gauge(TPM_LIMIT, "Tokens per minute limit", ENTITY, QueryFamily::RateLimits),
    gauge(RPM_LIMIT, "Requests per minute limit", ENTITY, QueryFamily::RateLimits),
    gauge(PARALLEL_REQUESTS, "Maximum parallel requests", ENTITY, QueryFamily::RateLimits),
    gauge(BLOCKED_STATUS, "Entity blocked status (1 blocked)", ENTITY, QueryFamily::RateLimits),
    gauge(MAX_BUDGET, "Maximum budget", ENTITY, QueryFamily::Budgets),
    gauge(SOFT_BUDGET, "Soft budget limit", ENTITY, QueryFamily::Budgets),
    gauge(BUDGET_RESET_AT, "Next budget reset as a Unix timestamp", ENTITY, QueryFamily::Budgets),
    gauge(BUDGET_CURRENT_SPEND, "Spend counted against the budget", ENTITY, QueryFamily::Budgets),
    gauge(BUDGET_UTILIZATION, "Budget utilization percentage", ENTITY, QueryFamily::Budgets),
    gauge(KEY_SPEND, "Spend recorded on the API key", KEY, QueryFamily::Keys),
    gauge(KEY_EXPIRES_AT, "API key expiry as a Unix timestamp", KEY, QueryFamily::Keys),
    gauge(KEY_BLOCKED_STATUS, "API key blocked status (1 blocked)", KEY, QueryFamily::Keys),
    gauge(
        KEY_INFO,
        "API key ownership, always 1",
        &["key_name", "key_alias", "user_id", "team_id"],
        QueryFamily::Keys,
    ),
    gauge(KEY_SPEND_30D, "API key spend over the last 30 days, from logs", KEY, QueryFamily::KeySpend),
    gauge(KEY_BUDGET, "Maximum budget for the API key", KEY, QueryFamily::KeyBudgets),
    gauge(KEY_BUDGET_SPEND, "API key spend in the current budget cycle", KEY, QueryFamily::KeyBudgets),
    gauge(
        KEY_BUDGET_RESET_AT,
        "API key budget reset as a Unix timestamp",
        KEY,
        QueryFamily::KeyBudgets,
    ),
    gauge(CURRENT_TPM, "Tokens in the last minute", MODEL_ENTITY, QueryFamily::CurrentRates),
    gauge(CURRENT_RPM, "Requests in the last minute", MODEL_ENTITY, QueryFamily::CurrentRates),
    exporter(COLLECTION_CYCLES, "Completed collection cycles", &[], MetricKind::Counter),
    exporter(QUERY_FAILURES, "Failed family collections", &["family"], MetricKind::Counter),
    exporter(
        LAST_SUCCESS,
        "Unix time of the last successful collection",
        &["family"],
        MetricKind::Gauge,
    ),
    exporter(CYCLE_DURATION, "Duration of the last collection cycle", &[], MetricKind::Gauge),
    exporter(SCHEMA_READY, "Whether all required tables exist (1 ready)", &[], MetricKind::Gauge),
    exporter(
        WINDOW_SECONDS,
        "Configured aggregation windows in seconds",
        &["window"],
        MetricKind::Gauge,
    ),
];

/// Look up a descriptor by metric name
pub fn descriptor(name: &str) -> Option<&'static MetricDescriptor> {
    METRICS.iter().find(|d| d.name == name)
}

/// Descriptors owned by one query family
pub fn family_metrics(family: QueryFamily) -> impl Iterator<Item = &'static MetricDescriptor> {
    METRICS.iter().filter(move |d| d.family == Some(family))
}

#[cfg(test)]
mod tests {
    use super::*;
    use litellm_exporter_common::METRIC_PREFIX;
    use std::collections::HashSet;

    #[test]
    fn test_names_unique_and_prefixed() {
        let mut seen = HashSet::new();
        for d in METRICS {
            assert!(d.name.starts_with(METRIC_PREFIX), "{}", d.name);
            assert!(seen.insert(d.name), "duplicate {}", d.name);
        }
    }

    #[test]
    fn test_labels_are_snake_case() {
        for d in METRICS {
            for label in d.labels {
                assert!(label.chars().all(|c| c.is_ascii_lowercase() || c == '_'), "{}", label);
            }
        }
    }

    #[test]
    fn test_every_family_publishes_something() {
        for family in QueryFamily::ALL {
            assert!(family_metrics(family).count() > 0, "{} has no metrics", family);
        }
        assert_eq!(descriptor(KEY_INFO).map(|d| d.labels.len()), Some(4));
        assert!(descriptor("litellm_nope").is_none());
    }
}
