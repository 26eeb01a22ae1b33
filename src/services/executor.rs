// Executor trait - the seam between bookkeeping and a live database
use std::sync::Arc;

use serde_json::Value;

use crate::error::StatementError;
use crate::models::{Dialect, QueryResult, Statement, TableRef};

/// Statement execution and catalog lookups against one database session
///
/// Implementations own the physical connection. A session issues one call at
/// a time and awaits it before the next, so implementations need no ordering
/// guarantees of their own.
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    /// Dialect of the backend behind this executor
    fn dialect(&self) -> Dialect;

    /// Execute a statement or a parameterless multi-statement script
    async fn execute(&self, statement: &Statement) -> Result<QueryResult, StatementError>;

    /// Whether `table` exists in the catalog
    async fn table_exists(&self, table: &TableRef) -> Result<bool, StatementError>;

    /// Schema unqualified names resolve to
    async fn current_default_schema(&self) -> Result<String, StatementError>;

    /// Execute plain SQL text
    async fn execute_sql(&self, sql: &str) -> Result<QueryResult, StatementError> {
        self.execute(&Statement::raw(sql)).await
    }
}

#[async_trait::async_trait]
impl<T: Executor + ?Sized> Executor for Arc<T> {
    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }

    async fn execute(&self, statement: &Statement) -> Result<QueryResult, StatementError> {
        (**self).execute(statement).await
    }

    async fn table_exists(&self, table: &TableRef) -> Result<bool, StatementError> {
        (**self).table_exists(table).await
    }

    async fn current_default_schema(&self) -> Result<String, StatementError> {
        (**self).current_default_schema().await
    }
}

/// Interpret a catalog answer (`true`, `1`, `'t'`, ...) as a boolean
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
        Some(Value::String(s)) => matches!(s.to_ascii_lowercase().as_str(), "t" | "true" | "1" | "yes"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_truthy() {
        assert!(is_truthy(Some(&json!(true))));
        assert!(is_truthy(Some(&json!(1))));
        assert!(is_truthy(Some(&json!("t"))));
        assert!(!is_truthy(Some(&json!("f"))));
        assert!(!is_truthy(Some(&json!(0))));
        assert!(!is_truthy(None));
    }
}
