//! SQL for every catalog query
//!
//! Windowed queries take the window length in seconds as `$1` and select
//! rows in `[NOW() - $1, NOW())`. Every query carries an `ORDER BY` so two
//! runs over unchanged data return rows in the same order.

use super::EntityBinding;
use crate::db::{Param, Query};

/// Existence check for one table, `$1` is the table name
pub const TABLE_EXISTS: Query = Query::fixed(
    "table_exists",
    r#"SELECT EXISTS (
        SELECT FROM information_schema.tables
        WHERE table_schema = 'public' AND table_name = $1
    ) AS "exists""#,
);

/// Spend grouped by model, owning entities and raw cache flag
///
/// The cache flag is left ungrouped-by-value in SQL and classified by the
/// engine, so hit/miss semantics live in one place.
pub const SPEND: Query = Query::fixed(
    "spend",
    r#"SELECT
        s.model,
        u.user_id,
        u.user_alias,
        t.team_id,
        t.team_alias,
        o.organization_id,
        o.organization_alias,
        s.cache_hit,
        SUM(s.spend) AS total_spend,
        SUM(s.total_tokens) AS total_tokens,
        SUM(s.prompt_tokens) AS prompt_tokens,
        SUM(s.completion_tokens) AS completion_tokens,
        COUNT(*) AS request_count
    FROM "LiteLLM_SpendLogs" s
    LEFT JOIN "LiteLLM_UserTable" u ON s."user" = u.user_id
    LEFT JOIN "LiteLLM_TeamTable" t ON s.team_id = t.team_id
    LEFT JOIN "LiteLLM_OrganizationTable" o ON t.organization_id = o.organization_id
    WHERE s."startTime" >= NOW() - make_interval(secs => $1)
      AND s."startTime" < NOW()
    GROUP BY s.model, u.user_id, u.user_alias, t.team_id, t.team_alias,
             o.organization_id, o.organization_alias, s.cache_hit
    ORDER BY s.model, u.user_id, t.team_id, o.organization_id, s.cache_hit"#,
);

/// User rate limits, blocked flag taken from the end-user record
pub const RATE_LIMITS_USER: Query = Query::fixed(
    "rate_limits.user",
    r#"SELECT
        u.user_id AS entity_id,
        u.user_alias AS entity_alias,
        u.tpm_limit,
        u.rpm_limit,
        u.max_parallel_requests,
        e.blocked
    FROM "LiteLLM_UserTable" u
    LEFT JOIN "LiteLLM_EndUserTable" e ON u.user_id = e.user_id
    WHERE u.tpm_limit IS NOT NULL
       OR u.rpm_limit IS NOT NULL
       OR u.max_parallel_requests IS NOT NULL
       OR e.blocked = true
    ORDER BY u.user_id"#,
);

pub const RATE_LIMITS_TEAM: Query = Query::fixed(
    "rate_limits.team",
    r#"SELECT
        team_id AS entity_id,
        team_alias AS entity_alias,
        tpm_limit,
        rpm_limit,
        max_parallel_requests,
        blocked
    FROM "LiteLLM_TeamTable"
    WHERE tpm_limit IS NOT NULL
       OR rpm_limit IS NOT NULL
       OR max_parallel_requests IS NOT NULL
       OR blocked = true
    ORDER BY team_id"#,
);

/// Every virtual key with its recorded spend
pub const KEYS: Query = Query::fixed(
    "keys",
    r#"SELECT
        token,
        key_name,
        key_alias,
        expires,
        user_id,
        team_id,
        blocked,
        spend
    FROM "LiteLLM_VerificationToken"
    ORDER BY token"#,
);

/// Spend per key recomputed from the logs
pub const KEY_SPEND: Query = Query::fixed(
    "key_spend",
    r#"SELECT
        v.key_name,
        v.key_alias,
        SUM(l.spend) AS total_spend
    FROM "LiteLLM_SpendLogs" l
    LEFT JOIN "LiteLLM_VerificationToken" v ON l.api_key = v.token
    WHERE l."startTime" >= NOW() - make_interval(secs => $1)
      AND l."startTime" < NOW()
    GROUP BY v.key_name, v.key_alias
    ORDER BY v.key_name, v.key_alias"#,
);

/// Key budgets with key-level values and the linked budget side by side
pub const KEY_BUDGETS: Query = Query::fixed(
    "key_budgets",
    r#"SELECT
        v.token,
        v.key_name,
        v.key_alias,
        v.max_budget AS key_max_budget,
        b.max_budget AS linked_max_budget,
        v.budget_reset_at AS key_budget_reset_at,
        b.budget_reset_at AS linked_budget_reset_at,
        (
            SELECT COALESCE(SUM(l.spend), 0)
            FROM "LiteLLM_SpendLogs" l
            WHERE l.api_key = v.token
              AND (
                  COALESCE(v.budget_reset_at, b.budget_reset_at) IS NULL
                  OR l."startTime" > COALESCE(v.budget_reset_at, b.budget_reset_at)
              )
        ) AS current_spend
    FROM "LiteLLM_VerificationToken" v
    LEFT JOIN "LiteLLM_BudgetTable" b ON v.budget_id = b.budget_id
    WHERE v.max_budget IS NOT NULL OR b.max_budget IS NOT NULL
    ORDER BY v.token"#,
);

/// Budget rows for one entity kind
pub fn budgets(binding: &EntityBinding) -> Query {
    Query::dynamic(
        format!("budgets.{}", binding.kind),
        format!(
            r#"SELECT
        m.{id} AS entity_id,
        e.{alias} AS entity_alias,
        b.max_budget,
        b.soft_budget,
        b.budget_reset_at,
        e.spend AS current_spend
    FROM "LiteLLM_BudgetTable" b
    JOIN "{membership}" m ON m.budget_id = b.budget_id
    LEFT JOIN "{table}" e ON e.{id} = m.{id}
    ORDER BY m.{id}, b.budget_id"#,
            id = binding.id_column,
            alias = binding.alias_column,
            membership = binding.budget_membership,
            table = binding.table,
        ),
    )
}

/// Token and request throughput for one entity kind, `$1` is the window
pub fn current_rates(binding: &EntityBinding) -> Query {
    Query::dynamic(
        format!("current_rates.{}", binding.kind),
        format!(
            r#"SELECT
        s.model,
        e.{id} AS entity_id,
        e.{alias} AS entity_alias,
        SUM(s.total_tokens) AS total_tokens,
        COUNT(*) AS request_count
    FROM "LiteLLM_SpendLogs" s
    {join}
    WHERE s."startTime" >= NOW() - make_interval(secs => $1)
      AND s."startTime" < NOW()
    GROUP BY s.model, e.{id}, e.{alias}
    ORDER BY s.model, e.{id}"#,
            id = binding.id_column,
            alias = binding.alias_column,
            join = binding.spend_join,
        ),
    )
}

/// Bind a window length in seconds
pub fn window_param(secs: f64) -> [Param; 1] {
    [Param::Float(secs)]
}
