//! Query catalog
//!
//! The fixed set of aggregation queries the exporter runs, the typed rows
//! they decode into, and the metric families they feed.

pub mod metrics;
pub mod queries;
pub mod rows;

use litellm_exporter_common::EntityKind;
use serde::Serialize;

pub use metrics::{MetricDescriptor, METRICS};

/// Tables every catalog family reads from
pub const REQUIRED_TABLES: &[&str] = &[
    "LiteLLM_SpendLogs",
    "LiteLLM_VerificationToken",
    "LiteLLM_BudgetTable",
    "LiteLLM_UserTable",
    "LiteLLM_EndUserTable",
    "LiteLLM_TeamTable",
    "LiteLLM_TeamMembership",
    "LiteLLM_OrganizationTable",
    "LiteLLM_OrganizationMembership",
];

/// One independently collected group of metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryFamily {
    Spend,
    RateLimits,
    Budgets,
    Keys,
    KeySpend,
    KeyBudgets,
    CurrentRates,
}

impl QueryFamily {
    pub const ALL: [QueryFamily; 7] = [
        QueryFamily::Spend,
        QueryFamily::RateLimits,
        QueryFamily::Budgets,
        QueryFamily::Keys,
        QueryFamily::KeySpend,
        QueryFamily::KeyBudgets,
        QueryFamily::CurrentRates,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryFamily::Spend => "spend",
            QueryFamily::RateLimits => "rate_limits",
            QueryFamily::Budgets => "budgets",
            QueryFamily::Keys => "keys",
            QueryFamily::KeySpend => "key_spend",
            QueryFamily::KeyBudgets => "key_budgets",
            QueryFamily::CurrentRates => "current_rates",
        }
    }
}

impl std::fmt::Display for QueryFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an entity kind lives in the schema
///
/// Lets the per-entity queries (budgets, current rates) be generated from a
/// single template instead of three hand-written union branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityBinding {
    pub kind: EntityKind,
    /// Entity table
    pub table: &'static str,
    pub id_column: &'static str,
    pub alias_column: &'static str,
    /// Table linking the entity to a budget row
    pub budget_membership: &'static str,
    /// Join from spend logs `s` to the entity table aliased `e`
    pub spend_join: &'static str,
}

pub const USER_BINDING: EntityBinding = EntityBinding {
    kind: EntityKind::User,
    table: "LiteLLM_UserTable",
    id_column: "user_id",
    alias_column: "user_alias",
    budget_membership: "LiteLLM_EndUserTable",
    spend_join: r#"JOIN "LiteLLM_UserTable" e ON s."user" = e.user_id"#,
};

pub const TEAM_BINDING: EntityBinding = EntityBinding {
    kind: EntityKind::Team,
    table: "LiteLLM_TeamTable",
    id_column: "team_id",
    alias_column: "team_alias",
    budget_membership: "LiteLLM_TeamMembership",
    spend_join: r#"JOIN "LiteLLM_TeamTable" e ON s.team_id = e.team_id"#,
};

pub const ORGANIZATION_BINDING: EntityBinding = EntityBinding {
    kind: EntityKind::Organization,
    table: "LiteLLM_OrganizationTable",
    id_column: "organization_id",
    alias_column: "organization_alias",
    budget_membership: "LiteLLM_OrganizationMembership",
    spend_join: r#"JOIN "LiteLLM_TeamTable" t ON s.team_id = t.team_id
        JOIN "LiteLLM_OrganizationTable" e ON t.organization_id = e.organization_id"#,
};

/// User, team and organization bindings, in publication order
pub const ENTITY_BINDINGS: [EntityBinding; 3] = [USER_BINDING, TEAM_BINDING, ORGANIZATION_BINDING];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_family_names_unique() {
        let names: HashSet<_> = QueryFamily::ALL.iter().map(|f| f.as_str()).collect();
        assert_eq!(names.len(), QueryFamily::ALL.len());
    }

    #[test]
    fn test_bindings_cover_each_kind_once() {
        let kinds: HashSet<_> = ENTITY_BINDINGS.iter().map(|b| b.kind).collect();
        assert_eq!(kinds.len(), 3);
        assert!(!kinds.contains(&EntityKind::Key));
    }
}
