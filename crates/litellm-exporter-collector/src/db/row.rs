//! Driver-independent result rows
//!
//! The execution port hands back rows as ordered `(column, value)` pairs.
//! Each query family decodes them into its own typed row right away.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::QueryError;

/// A single column value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Timestamp(_) => "timestamp",
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Bound query parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Param {
    Text(String),
    Int(i64),
    Float(f64),
}

/// One result row, columns in select order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            columns: Vec::with_capacity(capacity),
        }
    }

    /// Append a column
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.push((column.into(), value.into()));
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(c, v)| (c.as_str(), v))
    }

    /// Look up a column; a missing column is a decode error
    pub fn get(&self, column: &str) -> Result<&Value, QueryError> {
        self.columns
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
            .ok_or_else(|| QueryError::MissingColumn {
                column: column.to_string(),
            })
    }

    pub fn opt_str(&self, column: &str) -> Result<Option<&str>, QueryError> {
        match self.get(column)? {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s.as_str())),
            other => Err(type_mismatch(column, "text", other)),
        }
    }

    /// Text column as an owned string, empty strings treated as null
    pub fn opt_string(&self, column: &str) -> Result<Option<String>, QueryError> {
        Ok(self
            .opt_str(column)?
            .filter(|s| !s.is_empty())
            .map(str::to_string))
    }

    /// Numeric column widened to f64
    pub fn opt_f64(&self, column: &str) -> Result<Option<f64>, QueryError> {
        match self.get(column)? {
            Value::Null => Ok(None),
            Value::Float(f) => Ok(Some(*f)),
            Value::Int(i) => Ok(Some(*i as f64)),
            other => Err(type_mismatch(column, "number", other)),
        }
    }

    /// Numeric column, null read as zero
    pub fn f64_or_zero(&self, column: &str) -> Result<f64, QueryError> {
        Ok(self.opt_f64(column)?.unwrap_or(0.0))
    }

    pub fn opt_bool(&self, column: &str) -> Result<Option<bool>, QueryError> {
        match self.get(column)? {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(*b)),
            other => Err(type_mismatch(column, "bool", other)),
        }
    }

    pub fn opt_timestamp(&self, column: &str) -> Result<Option<DateTime<Utc>>, QueryError> {
        match self.get(column)? {
            Value::Null => Ok(None),
            Value::Timestamp(t) => Ok(Some(*t)),
            other => Err(type_mismatch(column, "timestamp", other)),
        }
    }
}

fn type_mismatch(column: &str, expected: &'static str, actual: &Value) -> QueryError {
    QueryError::ColumnType {
        column: column.to_string(),
        expected,
        actual: actual.type_name(),
    }
}
