// In-memory executor for unit tests
use std::collections::HashSet;
use std::sync::Mutex;

use serde_json::Value;

use crate::analysis::classify;
use crate::error::StatementError;
use crate::models::{Dialect, QueryResult, Statement, TableEvent, TableRef};
use crate::services::Executor;

/// Scripted executor with a tiny catalog
///
/// DDL passed to `execute` is classified and applied to the catalog, so
/// creates, drops and renames behave like a real backend. Statements whose
/// text contains a registered fragment fail or return canned rows instead.
pub struct MockExecutor {
    dialect: Dialect,
    default_schema: String,
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    tables: HashSet<(String, String)>,
    executed: Vec<Statement>,
    failures: Vec<(String, StatementError)>,
    responses: Vec<(String, Vec<Value>)>,
}

impl MockExecutor {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            default_schema: dialect.fallback_schema().to_string(),
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn with_default_schema(mut self, schema: &str) -> Self {
        self.default_schema = schema.to_string();
        self
    }

    pub fn with_table(self, schema: &str, table: &str) -> Self {
        self.add_table(schema, table);
        self
    }

    pub fn add_table(&self, schema: &str, table: &str) {
        let mut state = self.state.lock().unwrap();
        state.tables.insert((schema.to_string(), table.to_string()));
    }

    pub fn remove_table(&self, schema: &str, table: &str) {
        let mut state = self.state.lock().unwrap();
        state.tables.remove(&(schema.to_string(), table.to_string()));
    }

    pub fn has_table(&self, schema: &str, table: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.tables.contains(&(schema.to_string(), table.to_string()))
    }

    /// Fail every statement whose SQL contains `fragment`
    pub fn fail_on(&self, fragment: &str, error: StatementError) {
        let mut state = self.state.lock().unwrap();
        state.failures.push((fragment.to_string(), error));
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    /// Answer statements whose SQL contains `fragment` with `rows`
    pub fn respond(&self, fragment: &str, rows: Vec<Value>) {
        let mut state = self.state.lock().unwrap();
        state.responses.push((fragment.to_string(), rows));
    }

    pub fn executed(&self) -> Vec<Statement> {
        self.state.lock().unwrap().executed.clone()
    }

    pub fn executed_sql(&self) -> Vec<String> {
        self.executed().into_iter().map(|s| s.sql).collect()
    }

    /// How many executed statements contain `fragment`
    pub fn count_matching(&self, fragment: &str) -> usize {
        self.executed_sql().iter().filter(|sql| sql.contains(fragment)).count()
    }

    fn apply_ddl(&self, state: &mut MockState, sql: &str) {
        let Ok(classification) = classify(sql, &self.default_schema, self.dialect) else {
            return;
        };
        for event in classification.events() {
            match event {
                TableEvent::Created { table } => {
                    state.tables.insert((table.schema.clone(), table.table.clone()));
                }
                TableEvent::Dropped { table } => {
                    state.tables.remove(&(table.schema.clone(), table.table.clone()));
                }
                TableEvent::Renamed { from, to } => {
                    if state.tables.remove(&(from.schema.clone(), from.table.clone())) {
                        state.tables.insert((to.schema.clone(), to.table.clone()));
                    }
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Executor for MockExecutor {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn execute(&self, statement: &Statement) -> Result<QueryResult, StatementError> {
        let mut state = self.state.lock().unwrap();
        state.executed.push(statement.clone());

        if let Some((_, error)) = state
            .failures
            .iter()
            .find(|(fragment, _)| statement.sql.contains(fragment.as_str()))
        {
            return Err(error.clone());
        }

        if let Some((_, rows)) = state
            .responses
            .iter()
            .find(|(fragment, _)| statement.sql.contains(fragment.as_str()))
        {
            return Ok(QueryResult::from_rows(rows.clone(), 0));
        }

        self.apply_ddl(&mut state, &statement.sql);
        Ok(QueryResult::default())
    }

    async fn table_exists(&self, table: &TableRef) -> Result<bool, StatementError> {
        let state = self.state.lock().unwrap();
        Ok(state.tables.contains(&(table.schema.clone(), table.table.clone())))
    }

    async fn current_default_schema(&self) -> Result<String, StatementError> {
        Ok(self.default_schema.clone())
    }
}
