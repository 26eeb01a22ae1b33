use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Dialect;

/// Value bound to a statement placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Int(i64),
    Timestamp(NaiveDateTime),
}

/// A statement plus its bound parameters
///
/// Placeholders in `sql` follow the dialect (`$1` or `@P1`). A statement with
/// no parameters may hold a whole multi-statement script.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Builds a parameterised statement, numbering placeholders for the dialect
pub(crate) struct StatementBuilder {
    dialect: Dialect,
    sql: String,
    params: Vec<SqlValue>,
}

impl StatementBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    pub fn sql(mut self, fragment: &str) -> Self {
        self.sql.push_str(fragment);
        self
    }

    pub fn bind(mut self, value: SqlValue) -> Self {
        self.params.push(value);
        let placeholder = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
        self
    }

    pub fn build(self) -> Statement {
        Statement::with_params(self.sql, self.params)
    }
}

/// Query execution result
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub rows: Vec<Value>,
    pub row_count: usize,
    pub execution_time_ms: u64,
}

impl QueryResult {
    pub fn from_rows(rows: Vec<Value>, execution_time_ms: u64) -> Self {
        let row_count = rows.len();
        Self {
            rows,
            row_count,
            execution_time_ms,
        }
    }

    /// Value of `column` in the first row
    pub fn first_value(&self, column: &str) -> Option<&Value> {
        self.rows.first()?.get(column)
    }

    /// String values of one column, skipping NULLs
    pub fn column_strings(&self, column: &str) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| match row.get(column)? {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect()
    }
}

/// Per-call execution options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Propagate statement failures; when false they are logged and swallowed
    pub strict: bool,
    /// Log newly created tables with an expiration
    pub temp: bool,
    /// Statement issued by the library itself; skips bookkeeping
    pub internal: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            strict: true,
            temp: true,
            internal: false,
        }
    }
}

impl QueryOptions {
    pub fn permanent() -> Self {
        Self {
            temp: false,
            ..Self::default()
        }
    }

    pub fn best_effort() -> Self {
        Self {
            strict: false,
            ..Self::default()
        }
    }

    pub fn internal() -> Self {
        Self {
            internal: true,
            ..Self::default()
        }
    }
}

/// Where a session is in its statement cycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Executing,
    PostProcessing,
}
