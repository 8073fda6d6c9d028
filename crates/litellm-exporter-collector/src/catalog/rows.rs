//! Typed rows, one per catalog query
//!
//! Decoded straight from the execution port's rows. A missing column or a
//! column of the wrong type fails the whole family for the cycle.

use chrono::{DateTime, Utc};

use crate::db::{QueryError, Row};

/// Three-valued cache flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
    /// Anything but the two literals, counted as neither
    Unknown,
}

impl CacheOutcome {
    pub fn classify(flag: Option<&str>) -> Self {
        match flag {
            Some("true") => CacheOutcome::Hit,
            Some("false") => CacheOutcome::Miss,
            _ => CacheOutcome::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpendRow {
    pub model: Option<String>,
    pub user_id: Option<String>,
    pub user_alias: Option<String>,
    pub team_id: Option<String>,
    pub team_alias: Option<String>,
    pub organization_id: Option<String>,
    pub organization_alias: Option<String>,
    pub cache: CacheOutcome,
    pub total_spend: f64,
    pub total_tokens: f64,
    pub prompt_tokens: f64,
    pub completion_tokens: f64,
    pub request_count: f64,
}

impl TryFrom<&Row> for SpendRow {
    type Error = QueryError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Self {
            model: row.opt_string("model")?,
            user_id: row.opt_string("user_id")?,
            user_alias: row.opt_string("user_alias")?,
            team_id: row.opt_string("team_id")?,
            team_alias: row.opt_string("team_alias")?,
            organization_id: row.opt_string("organization_id")?,
            organization_alias: row.opt_string("organization_alias")?,
            cache: CacheOutcome::classify(row.opt_str("cache_hit")?),
            total_spend: row.f64_or_zero("total_spend")?,
            total_tokens: row.f64_or_zero("total_tokens")?,
            prompt_tokens: row.f64_or_zero("prompt_tokens")?,
            completion_tokens: row.f64_or_zero("completion_tokens")?,
            request_count: row.f64_or_zero("request_count")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitRow {
    pub entity_id: Option<String>,
    pub entity_alias: Option<String>,
    pub tpm_limit: Option<f64>,
    pub rpm_limit: Option<f64>,
    pub max_parallel_requests: Option<f64>,
    /// Null reads as not blocked
    pub blocked: bool,
}

impl TryFrom<&Row> for RateLimitRow {
    type Error = QueryError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Self {
            entity_id: row.opt_string("entity_id")?,
            entity_alias: row.opt_string("entity_alias")?,
            tpm_limit: row.opt_f64("tpm_limit")?,
            rpm_limit: row.opt_f64("rpm_limit")?,
            max_parallel_requests: row.opt_f64("max_parallel_requests")?,
            blocked: row.opt_bool("blocked")?.unwrap_or(false),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetRow {
    pub entity_id: Option<String>,
    pub entity_alias: Option<String>,
    pub max_budget: Option<f64>,
    pub soft_budget: Option<f64>,
    pub budget_reset_at: Option<DateTime<Utc>>,
    pub current_spend: Option<f64>,
}

impl BudgetRow {
    /// Percentage of the budget spent, when there is a positive budget
    pub fn utilization(&self) -> Option<f64> {
        match (self.current_spend, self.max_budget) {
            (Some(spend), Some(max)) if max > 0.0 => Some(spend / max * 100.0),
            _ => None,
        }
    }
}

impl TryFrom<&Row> for BudgetRow {
    type Error = QueryError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Self {
            entity_id: row.opt_string("entity_id")?,
            entity_alias: row.opt_string("entity_alias")?,
            max_budget: row.opt_f64("max_budget")?,
            soft_budget: row.opt_f64("soft_budget")?,
            budget_reset_at: row.opt_timestamp("budget_reset_at")?,
            current_spend: row.opt_f64("current_spend")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyRow {
    pub token: Option<String>,
    pub key_name: Option<String>,
    pub key_alias: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
    pub team_id: Option<String>,
    pub blocked: bool,
    /// Spend recorded on the key itself
    pub spend: f64,
}

impl TryFrom<&Row> for KeyRow {
    type Error = QueryError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Self {
            token: row.opt_string("token")?,
            key_name: row.opt_string("key_name")?,
            key_alias: row.opt_string("key_alias")?,
            expires: row.opt_timestamp("expires")?,
            user_id: row.opt_string("user_id")?,
            team_id: row.opt_string("team_id")?,
            blocked: row.opt_bool("blocked")?.unwrap_or(false),
            spend: row.f64_or_zero("spend")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeySpendRow {
    pub key_name: Option<String>,
    pub key_alias: Option<String>,
    pub total_spend: f64,
}

impl TryFrom<&Row> for KeySpendRow {
    type Error = QueryError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Self {
            key_name: row.opt_string("key_name")?,
            key_alias: row.opt_string("key_alias")?,
            total_spend: row.f64_or_zero("total_spend")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyBudgetRow {
    pub token: Option<String>,
    pub key_name: Option<String>,
    pub key_alias: Option<String>,
    pub key_max_budget: Option<f64>,
    pub linked_max_budget: Option<f64>,
    pub key_budget_reset_at: Option<DateTime<Utc>>,
    pub linked_budget_reset_at: Option<DateTime<Utc>>,
    /// Log spend since the effective reset time
    pub current_spend: f64,
}

impl KeyBudgetRow {
    /// Key-level budget, falling back to the linked budget record
    pub fn max_budget(&self) -> Option<f64> {
        self.key_max_budget.or(self.linked_max_budget)
    }

    pub fn budget_reset_at(&self) -> Option<DateTime<Utc>> {
        self.key_budget_reset_at.or(self.linked_budget_reset_at)
    }
}

impl TryFrom<&Row> for KeyBudgetRow {
    type Error = QueryError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Self {
            token: row.opt_string("token")?,
            key_name: row.opt_string("key_name")?,
            key_alias: row.opt_string("key_alias")?,
            key_max_budget: row.opt_f64("key_max_budget")?,
            linked_max_budget: row.opt_f64("linked_max_budget")?,
            key_budget_reset_at: row.opt_timestamp("key_budget_reset_at")?,
            linked_budget_reset_at: row.opt_timestamp("linked_budget_reset_at")?,
            current_spend: row.f64_or_zero("current_spend")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurrentRateRow {
    pub model: Option<String>,
    pub entity_id: Option<String>,
    pub entity_alias: Option<String>,
    pub total_tokens: f64,
    pub request_count: f64,
}

impl TryFrom<&Row> for CurrentRateRow {
    type Error = QueryError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Self {
            model: row.opt_string("model")?,
            entity_id: row.opt_string("entity_id")?,
            entity_alias: row.opt_string("entity_alias")?,
            total_tokens: row.f64_or_zero("total_tokens")?,
            request_count: row.f64_or_zero("request_count")?,
        })
    }
}

/// Result of the table existence check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableExistsRow {
    pub exists: bool,
}

impl TryFrom<&Row> for TableExistsRow {
    type Error = QueryError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Self {
            exists: row.opt_bool("exists")?.unwrap_or(false),
        })
    }
}

/// Decode every row, failing on the first bad one
pub fn decode_all<'a, T>(rows: &'a [Row]) -> Result<Vec<T>, QueryError>
where
    T: TryFrom<&'a Row, Error = QueryError>,
{
    rows.iter().map(T::try_from).collect()
}
