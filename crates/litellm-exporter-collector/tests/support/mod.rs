//! Shared fixtures for collector integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use litellm_exporter_collector::db::{ConnectionSource, Param, PooledConnection, Row, Value};
use litellm_exporter_collector::QueryError;
use parking_lot::Mutex;

/// In-process stand-in for the LiteLLM database
///
/// Answers by recognising the SQL of each catalog query. Counts every
/// connection borrowed and returned.
#[derive(Default)]
pub struct FakeDatabase {
    pub acquired: AtomicUsize,
    pub released: Arc<AtomicUsize>,
    pub budget_attempts: AtomicUsize,
    pub budgets_down: AtomicBool,
    pub spend_rows: Mutex<Vec<Row>>,
    pub team_budget_rows: Mutex<Vec<Row>>,
}

impl FakeDatabase {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_spend(&self, rows: Vec<Row>) {
        *self.spend_rows.lock() = rows;
    }

    pub fn set_team_budgets(&self, rows: Vec<Row>) {
        *self.team_budget_rows.lock() = rows;
    }

    pub fn fail_budgets(&self, down: bool) {
        self.budgets_down.store(down, Ordering::SeqCst);
    }

    pub fn balanced(&self) -> bool {
        self.acquired.load(Ordering::SeqCst) == self.released.load(Ordering::SeqCst)
    }

    fn answer(&self, sql: &str) -> Result<Vec<Row>, QueryError> {
        if sql.contains(r#"AS "exists""#) {
            return Ok(vec![Row::new().with("exists", true)]);
        }
        if sql.contains("s.cache_hit") {
            return Ok(self.spend_rows.lock().clone());
        }
        if sql.contains("m ON m.budget_id") {
            self.budget_attempts.fetch_add(1, Ordering::SeqCst);
            if self.budgets_down.load(Ordering::SeqCst) {
                return Err(QueryError::Database {
                    code: Some("42P01".into()),
                    message: "relation \"LiteLLM_BudgetTable\" does not exist".into(),
                });
            }
            if sql.contains("LiteLLM_TeamMembership") {
                return Ok(self.team_budget_rows.lock().clone());
            }
        }
        Ok(Vec::new())
    }
}

pub struct FakeSource(pub Arc<FakeDatabase>);

pub struct FakeConnection {
    db: Arc<FakeDatabase>,
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.db.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PooledConnection for FakeConnection {
    async fn fetch_all(&mut self, sql: &str, _params: &[Param]) -> Result<Vec<Row>, QueryError> {
        self.db.answer(sql)
    }
}

#[async_trait]
impl ConnectionSource for FakeSource {
    type Connection = FakeConnection;

    async fn acquire(&self) -> Result<FakeConnection, QueryError> {
        self.0.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(FakeConnection { db: self.0.clone() })
    }
}

/// A single spend-log group in the shape the spend query returns
pub fn spend_row(model: &str, user_id: &str, spend: f64, cache_hit: &str) -> Row {
    Row::new()
        .with("model", model)
        .with("user_id", user_id)
        .with("user_alias", Value::Null)
        .with("team_id", Value::Null)
        .with("team_alias", Value::Null)
        .with("organization_id", Value::Null)
        .with("organization_alias", Value::Null)
        .with("cache_hit", cache_hit)
        .with("total_spend", spend)
        .with("total_tokens", 120i64)
        .with("prompt_tokens", 100i64)
        .with("completion_tokens", 20i64)
        .with("request_count", 1i64)
}

pub fn team_budget_row(team_id: &str, max_budget: f64, spend: f64) -> Row {
    Row::new()
        .with("entity_id", team_id)
        .with("entity_alias", "research")
        .with("max_budget", max_budget)
        .with("soft_budget", Value::Null)
        .with("budget_reset_at", Value::Null)
        .with("current_spend", spend)
}
