//! In-memory executor answering queries from a script
//!
//! Stands in for the database in tests and benchmarks. Responses are keyed
//! by query name; a name may hold a queue of one-shot responses followed by
//! a standing response.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::error::QueryError;
use super::port::{Query, QueryExecutor};
use super::row::{Param, Row};

/// A scripted response
#[derive(Debug, Clone)]
pub enum Scripted {
    Rows(Vec<Row>),
    /// Fail with a database error carrying this message
    Fail(String),
}

impl Scripted {
    fn to_result(&self) -> Result<Vec<Row>, QueryError> {
        match self {
            Scripted::Rows(rows) => Ok(rows.clone()),
            Scripted::Fail(message) => Err(QueryError::Database {
                code: None,
                message: message.clone(),
            }),
        }
    }
}

#[derive(Default)]
struct Script {
    queued: VecDeque<Scripted>,
    standing: Option<Scripted>,
}

/// Executor driven by per-query scripts
#[derive(Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, Script>>,
    calls: DashMap<String, usize>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every call to `name` with these rows
    pub fn respond(&self, name: &str, rows: Vec<Row>) -> &Self {
        self.scripts.lock().entry(name.to_string()).or_default().standing = Some(Scripted::Rows(rows));
        self
    }

    /// Fail every call to `name`
    pub fn fail(&self, name: &str, message: &str) -> &Self {
        self.scripts.lock().entry(name.to_string()).or_default().standing =
            Some(Scripted::Fail(message.to_string()));
        self
    }

    /// Answer the next call to `name` once, ahead of the standing response
    pub fn respond_once(&self, name: &str, response: Scripted) -> &Self {
        self.scripts
            .lock()
            .entry(name.to_string())
            .or_default()
            .queued
            .push_back(response);
        self
    }

    /// Number of calls made for `name`
    pub fn calls(&self, name: &str) -> usize {
        self.calls.get(name).map(|c| *c).unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.iter().map(|entry| *entry.value()).sum()
    }
}

#[async_trait]
impl QueryExecutor for ScriptedExecutor {
    async fn execute(&self, query: &Query, _params: &[Param]) -> Result<Vec<Row>, QueryError> {
        *self.calls.entry(query.name.to_string()).or_insert(0) += 1;

        let mut scripts = self.scripts.lock();
        let Some(script) = scripts.get_mut(query.name.as_ref()) else {
            // Unscripted queries see an empty table
            return Ok(Vec::new());
        };
        match script.queued.pop_front() {
            Some(response) => response.to_result(),
            None => script
                .standing
                .as_ref()
                .map(Scripted::to_result)
                .unwrap_or_else(|| Ok(Vec::new())),
        }
    }
}
