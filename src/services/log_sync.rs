// Log-table synchronizer
//
// Keeps the per-user `__temp_log_table_<user>__` tables in step with what a
// session creates, renames and drops, and expires old entries. One log table
// lives in every schema that holds a tracked table.

use chrono::{NaiveDateTime, Utc};
use serde::Serialize;

use crate::error::{LogSyncError, StatementError};
use crate::models::{
    log_table_name, Dialect, LogEntry, QueryResult, SqlValue, Statement, StatementBuilder, TableRef,
};
use crate::services::executor::Executor;
use crate::services::profile::{DialectProfile, TABLE_NAME_COLUMN, TABLE_SCHEMA_COLUMN};

/// Outcome of a purge + reconcile pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HousekeepingReport {
    /// Expired tables dropped
    pub purged: usize,
    /// Stale log rows removed
    pub reconciled: usize,
}

impl HousekeepingReport {
    fn add(&mut self, other: HousekeepingReport) {
        self.purged += other.purged;
        self.reconciled += other.reconciled;
    }
}

#[derive(Debug, Clone)]
pub struct LogTableSynchronizer {
    profile: DialectProfile,
    owner: String,
    log_name: String,
    expiration_days: i64,
    /// Schema whose tables are never logged
    archive_schema: Option<String>,
}

impl LogTableSynchronizer {
    pub fn new(dialect: Dialect, owner: &str, expiration_days: i64) -> Self {
        Self {
            profile: DialectProfile::new(dialect),
            owner: owner.to_string(),
            log_name: log_table_name(owner),
            expiration_days,
            archive_schema: None,
        }
    }

    pub fn with_archive_schema(mut self, schema: Option<String>) -> Self {
        self.archive_schema = schema;
        self
    }

    pub fn log_name(&self) -> &str {
        &self.log_name
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn expiration_days(&self) -> i64 {
        self.expiration_days
    }

    /// Whether `table` gets a log row at all
    ///
    /// Tables in another database or on a linked server, tables in the
    /// archive schema and the log table itself are never logged.
    pub fn is_loggable(&self, table: &TableRef) -> bool {
        if table.server.is_some() || table.database.is_some() {
            return false;
        }
        if self
            .archive_schema
            .as_deref()
            .is_some_and(|archive| archive.eq_ignore_ascii_case(&table.schema))
        {
            return false;
        }
        !table.table.eq_ignore_ascii_case(&self.log_name)
    }

    fn log_ref(&self, schema: &str) -> TableRef {
        TableRef::new(schema, self.log_name.clone())
    }

    fn log_qualified(&self, schema: &str) -> String {
        self.profile.local_name(schema, &self.log_name)
    }

    fn builder(&self) -> StatementBuilder {
        StatementBuilder::new(self.profile.dialect())
    }

    async fn run<E: Executor + ?Sized>(
        &self,
        exec: &E,
        schema: &str,
        operation: &'static str,
        statement: &Statement,
    ) -> Result<QueryResult, LogSyncError> {
        exec.execute(statement)
            .await
            .map_err(|source| sync_error(schema, operation, source))
    }

    pub async fn log_exists<E: Executor + ?Sized>(&self, exec: &E, schema: &str) -> Result<bool, LogSyncError> {
        exec.table_exists(&self.log_ref(schema))
            .await
            .map_err(|source| sync_error(schema, "lookup", source))
    }

    /// Create the log in `schema` unless present; true when it was created
    pub async fn ensure_log<E: Executor + ?Sized>(&self, exec: &E, schema: &str) -> Result<bool, LogSyncError> {
        if self.log_exists(exec, schema).await? {
            return Ok(false);
        }

        let ddl = self.profile.create_log_table(schema, &self.log_name);
        self.run(exec, schema, "create", &ddl).await?;
        tracing::debug!("Created log table {}", self.log_qualified(schema));
        Ok(true)
    }

    /// Write `entry`, replacing any row already held for the same table
    pub async fn log_insert<E: Executor + ?Sized>(&self, exec: &E, entry: &LogEntry) -> Result<(), LogSyncError> {
        let schema = entry.schema.as_str();
        self.ensure_log(exec, schema).await?;
        self.delete_row(exec, schema, &entry.table).await?;

        let mut builder = self
            .builder()
            .sql(&format!(
                "INSERT INTO {} (table_owner, table_schema, table_name, created_on, expires) VALUES (",
                self.log_qualified(schema)
            ))
            .bind(SqlValue::Text(entry.owner.clone()))
            .sql(", ")
            .bind(SqlValue::Text(entry.schema.clone()))
            .sql(", ")
            .bind(SqlValue::Text(entry.table.clone()))
            .sql(", ")
            .bind(SqlValue::Timestamp(entry.created_on))
            .sql(", ");
        builder = match entry.expires {
            Some(expires) => builder.bind(SqlValue::Timestamp(expires)),
            None => builder.sql("NULL"),
        };
        let insert = builder.sql(")").build();

        self.run(exec, schema, "insert", &insert).await?;
        tracing::debug!(
            "Logged {}.{} (expires: {:?})",
            entry.schema,
            entry.table,
            entry.expires
        );
        Ok(())
    }

    /// Log a table the session just created; false when it is not loggable
    pub async fn track_created<E: Executor + ?Sized>(
        &self,
        exec: &E,
        table: &TableRef,
        temp: bool,
    ) -> Result<bool, LogSyncError> {
        if !self.is_loggable(table) {
            tracing::debug!("Not logging {}", table);
            return Ok(false);
        }

        let expiration = temp.then_some(self.expiration_days);
        let entry = LogEntry::new(self.owner.clone(), table.schema.clone(), table.table.clone(), expiration);
        self.log_insert(exec, &entry).await?;
        Ok(true)
    }

    /// Point the row for `old_table` at `new_table`; false when `schema` has no log
    pub async fn log_update_rename<E: Executor + ?Sized>(
        &self,
        exec: &E,
        schema: &str,
        old_table: &str,
        new_table: &str,
    ) -> Result<bool, LogSyncError> {
        if !self.log_exists(exec, schema).await? {
            return Ok(false);
        }

        // a row already naming the target would become a duplicate
        self.delete_row(exec, schema, new_table).await?;
        let update = self
            .builder()
            .sql(&format!("UPDATE {} SET table_name = ", self.log_qualified(schema)))
            .bind(SqlValue::Text(new_table.to_string()))
            .sql(" WHERE table_schema = ")
            .bind(SqlValue::Text(schema.to_string()))
            .sql(" AND table_name = ")
            .bind(SqlValue::Text(old_table.to_string()))
            .build();
        self.run(exec, schema, "update", &update).await?;
        Ok(true)
    }

    /// Remove the row for a dropped table; false when `schema` has no log
    pub async fn log_delete<E: Executor + ?Sized>(
        &self,
        exec: &E,
        schema: &str,
        table: &str,
    ) -> Result<bool, LogSyncError> {
        if !self.log_exists(exec, schema).await? {
            return Ok(false);
        }
        self.delete_row(exec, schema, table).await?;
        Ok(true)
    }

    async fn delete_row<E: Executor + ?Sized>(&self, exec: &E, schema: &str, table: &str) -> Result<(), LogSyncError> {
        let delete = self
            .builder()
            .sql(&format!("DELETE FROM {} WHERE table_schema = ", self.log_qualified(schema)))
            .bind(SqlValue::Text(schema.to_string()))
            .sql(" AND table_name = ")
            .bind(SqlValue::Text(table.to_string()))
            .build();
        self.run(exec, schema, "delete", &delete).await?;
        Ok(())
    }

    /// Remove every row naming `table`, whatever schema the row recorded
    async fn delete_rows_named<E: Executor + ?Sized>(
        &self,
        exec: &E,
        schema: &str,
        table: &str,
    ) -> Result<(), LogSyncError> {
        let delete = self
            .builder()
            .sql(&format!("DELETE FROM {} WHERE table_name = ", self.log_qualified(schema)))
            .bind(SqlValue::Text(table.to_string()))
            .build();
        self.run(exec, schema, "delete", &delete).await?;
        Ok(())
    }

    async fn logged_tables<E: Executor + ?Sized>(
        &self,
        exec: &E,
        schema: &str,
        expired_before: Option<NaiveDateTime>,
    ) -> Result<Vec<String>, LogSyncError> {
        let mut builder = self.builder().sql(&format!(
            "SELECT DISTINCT table_name AS {} FROM {}",
            TABLE_NAME_COLUMN,
            self.log_qualified(schema)
        ));
        if let Some(cutoff) = expired_before {
            builder = builder.sql(" WHERE expires < ").bind(SqlValue::Timestamp(cutoff));
        }
        let result = self.run(exec, schema, "select", &builder.build()).await?;
        Ok(result.column_strings(TABLE_NAME_COLUMN))
    }

    /// Drop every table in `schema` whose entry has expired
    ///
    /// Tables already gone are left for [`reconcile`](Self::reconcile); a
    /// table that fails to drop keeps its row and is retried next time.
    pub async fn purge_expired<E: Executor + ?Sized>(&self, exec: &E, schema: &str) -> Result<usize, LogSyncError> {
        if !self.log_exists(exec, schema).await? {
            return Ok(0);
        }

        let now = Utc::now().naive_utc();
        let expired = self.logged_tables(exec, schema, Some(now)).await?;
        let mut purged = 0;

        for name in expired {
            let table = TableRef::new(schema, name.clone());
            if !self.table_present(exec, &table).await {
                continue;
            }
            match exec.execute(&self.profile.drop_table_if_exists(&table)).await {
                Ok(_) => {
                    tracing::info!("Dropped expired table {}", table);
                    self.delete_rows_named(exec, schema, &name).await?;
                    purged += 1;
                }
                Err(e) if e.is_missing_table() => {}
                Err(e) => tracing::warn!("Failed to drop expired table {}: {}", table, e),
            }
        }

        Ok(purged)
    }

    /// Delete rows in `schema`'s log that name tables which no longer exist
    pub async fn reconcile<E: Executor + ?Sized>(&self, exec: &E, schema: &str) -> Result<usize, LogSyncError> {
        if !self.log_exists(exec, schema).await? {
            return Ok(0);
        }

        let logged = self.logged_tables(exec, schema, None).await?;
        let mut removed = 0;

        for name in logged {
            let table = TableRef::new(schema, name.clone());
            let exists = exec
                .table_exists(&table)
                .await
                .map_err(|source| sync_error(schema, "lookup", source))?;
            if !exists {
                self.delete_rows_named(exec, schema, &name).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!("Removed {} stale rows from {}", removed, self.log_qualified(schema));
        }
        Ok(removed)
    }

    /// Schemas in which this user's log table exists
    pub async fn schemas_with_log<E: Executor + ?Sized>(&self, exec: &E) -> Result<Vec<String>, LogSyncError> {
        let result = self
            .run(exec, "*", "lookup", &self.profile.schemas_with_log(&self.log_name))
            .await?;
        Ok(result.column_strings(TABLE_SCHEMA_COLUMN))
    }

    /// Purge then reconcile every schema holding a log
    ///
    /// A failure in one schema is logged and the pass moves on.
    pub async fn housekeeping<E: Executor + ?Sized>(&self, exec: &E) -> Result<HousekeepingReport, LogSyncError> {
        let mut report = HousekeepingReport::default();

        for schema in self.schemas_with_log(exec).await? {
            match self.housekeep_schema(exec, &schema).await {
                Ok(schema_report) => report.add(schema_report),
                Err(e) => tracing::warn!("Log housekeeping skipped schema {}: {}", schema, e),
            }
        }

        tracing::debug!(
            "Log housekeeping done (purged: {}, reconciled: {})",
            report.purged,
            report.reconciled
        );
        Ok(report)
    }

    async fn housekeep_schema<E: Executor + ?Sized>(
        &self,
        exec: &E,
        schema: &str,
    ) -> Result<HousekeepingReport, LogSyncError> {
        // purge first: tables it fails to find become stale rows for reconcile
        let purged = self.purge_expired(exec, schema).await?;
        let reconciled = self.reconcile(exec, schema).await?;
        Ok(HousekeepingReport { purged, reconciled })
    }

    async fn table_present<E: Executor + ?Sized>(&self, exec: &E, table: &TableRef) -> bool {
        match exec.table_exists(table).await {
            Ok(exists) => exists,
            Err(e) => {
                tracing::warn!("Could not check {}: {}", table, e);
                false
            }
        }
    }
}

fn sync_error(schema: &str, operation: &'static str, source: StatementError) -> LogSyncError {
    LogSyncError {
        schema: schema.to_string(),
        operation,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockExecutor;
    use chrono::Duration;
    use serde_json::json;

    const LOG: &str = "__temp_log_table_alice__";

    fn sync(dialect: Dialect) -> LogTableSynchronizer {
        LogTableSynchronizer::new(dialect, "Alice", 7).with_archive_schema(Some("archive".into()))
    }

    #[tokio::test]
    async fn test_ensure_log_creates_once() {
        let exec = MockExecutor::new(Dialect::Pg);
        let sync = sync(Dialect::Pg);

        assert!(sync.ensure_log(&exec, "working").await.unwrap());
        assert!(exec.has_table("working", LOG));
        assert!(!sync.ensure_log(&exec, "working").await.unwrap());
        assert_eq!(exec.count_matching("CREATE TABLE"), 1);
    }

    #[tokio::test]
    async fn test_log_insert_replaces_row_with_bound_values() {
        let exec = MockExecutor::new(Dialect::Pg);
        let sync = sync(Dialect::Pg);
        let table = TableRef::new("working", "roads");

        assert!(sync.track_created(&exec, &table, true).await.unwrap());

        let executed = exec.executed();
        let delete_at = executed.iter().position(|s| s.sql.starts_with("DELETE FROM")).unwrap();
        let insert_at = executed.iter().position(|s| s.sql.starts_with("INSERT INTO")).unwrap();
        assert!(delete_at < insert_at);

        let insert = &executed[insert_at];
        assert_eq!(
            insert.sql,
            "INSERT INTO working.__temp_log_table_alice__ (table_owner, table_schema, table_name, created_on, expires) VALUES ($1, $2, $3, $4, $5)"
        );
        assert_eq!(insert.params[0], SqlValue::Text("Alice".into()));
        assert_eq!(insert.params[2], SqlValue::Text("roads".into()));
        match (&insert.params[3], &insert.params[4]) {
            (SqlValue::Timestamp(created), SqlValue::Timestamp(expires)) => {
                assert_eq!(*expires - *created, Duration::days(7));
            }
            other => panic!("unexpected params {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_permanent_entry_has_null_expiry() {
        let exec = MockExecutor::new(Dialect::Ms);
        let sync = sync(Dialect::Ms);

        sync.track_created(&exec, &TableRef::new("dbo", "keep"), false).await.unwrap();

        let insert = exec
            .executed()
            .into_iter()
            .find(|s| s.sql.starts_with("INSERT INTO"))
            .unwrap();
        assert!(insert.sql.ends_with("@P4, NULL)"));
        assert_eq!(insert.params.len(), 4);
    }

    #[tokio::test]
    async fn test_unloggable_tables_are_skipped() {
        let exec = MockExecutor::new(Dialect::Ms);
        let sync = sync(Dialect::Ms);

        let archived = TableRef::new("archive", "t");
        let remote = TableRef::new("dbo", "t").with_database("otherdb");
        let itself = TableRef::new("dbo", LOG);

        for table in [archived, remote, itself] {
            assert!(!sync.track_created(&exec, &table, true).await.unwrap());
        }
        assert!(exec.executed().is_empty());
    }

    #[tokio::test]
    async fn test_update_and_delete_need_a_log() {
        let exec = MockExecutor::new(Dialect::Pg);
        let sync = sync(Dialect::Pg);

        assert!(!sync.log_update_rename(&exec, "working", "a", "b").await.unwrap());
        assert!(!sync.log_delete(&exec, "working", "a").await.unwrap());
        assert!(exec.executed().is_empty());

        exec.add_table("working", LOG);
        assert!(sync.log_update_rename(&exec, "working", "a", "b").await.unwrap());
        let update = exec.executed().pop().unwrap();
        assert!(update.sql.starts_with("UPDATE working.__temp_log_table_alice__ SET table_name = $1"));
        assert_eq!(update.params[0], SqlValue::Text("b".into()));
        assert_eq!(update.params[2], SqlValue::Text("a".into()));
    }

    #[tokio::test]
    async fn test_purge_drops_expired_tables_present() {
        let exec = MockExecutor::new(Dialect::Pg)
            .with_table("working", LOG)
            .with_table("working", "old_a")
            .with_table("working", "old_b");
        exec.respond(
            "WHERE expires <",
            vec![
                json!({"table_name": "old_a"}),
                json!({"table_name": "old_b"}),
                json!({"table_name": "gone"}),
            ],
        );
        let sync = sync(Dialect::Pg);

        let purged = sync.purge_expired(&exec, "working").await.unwrap();

        assert_eq!(purged, 2);
        assert!(!exec.has_table("working", "old_a"));
        assert!(!exec.has_table("working", "old_b"));
        assert_eq!(exec.count_matching("DROP TABLE IF EXISTS"), 2);
        assert_eq!(exec.count_matching("DELETE FROM working.__temp_log_table_alice__ WHERE table_name"), 2);
    }

    #[tokio::test]
    async fn test_purge_tolerates_drop_failures() {
        let exec = MockExecutor::new(Dialect::Pg)
            .with_table("working", LOG)
            .with_table("working", "locked");
        exec.respond("WHERE expires <", vec![json!({"table_name": "locked"})]);
        exec.fail_on("DROP TABLE IF EXISTS", StatementError::new("lock timeout").with_code("55P03"));

        let purged = sync(Dialect::Pg).purge_expired(&exec, "working").await.unwrap();
        assert_eq!(purged, 0);
        assert_eq!(exec.count_matching("DELETE FROM"), 0);
    }

    #[tokio::test]
    async fn test_reconcile_removes_stale_rows() {
        let exec = MockExecutor::new(Dialect::Pg)
            .with_table("working", LOG)
            .with_table("working", "alive");
        exec.respond(
            "SELECT DISTINCT table_name",
            vec![json!({"table_name": "alive"}), json!({"table_name": "vanished"})],
        );

        let removed = sync(Dialect::Pg).reconcile(&exec, "working").await.unwrap();

        assert_eq!(removed, 1);
        let delete = exec
            .executed()
            .into_iter()
            .find(|s| s.sql.starts_with("DELETE FROM"))
            .unwrap();
        assert_eq!(delete.params, vec![SqlValue::Text("vanished".into())]);
    }

    #[tokio::test]
    async fn test_housekeeping_visits_every_schema() {
        let exec = MockExecutor::new(Dialect::Pg)
            .with_table("a", LOG)
            .with_table("b", LOG)
            .with_table("a", "expired");
        exec.respond(
            "AS table_schema FROM",
            vec![json!({"table_schema": "a"}), json!({"table_schema": "b"})],
        );
        exec.respond("WHERE expires <", vec![json!({"table_name": "expired"})]);

        let report = sync(Dialect::Pg).housekeeping(&exec).await.unwrap();

        assert_eq!(report.purged, 1);
        assert!(!exec.has_table("a", "expired"));
        let drops = exec.count_matching("DROP TABLE");
        assert_eq!(drops, 1);
    }

    #[tokio::test]
    async fn test_log_failures_carry_schema_and_operation() {
        let exec = MockExecutor::new(Dialect::Pg).with_table("working", LOG);
        exec.fail_on("INSERT INTO", StatementError::new("permission denied").with_code("42501"));

        let err = sync(Dialect::Pg)
            .track_created(&exec, &TableRef::new("working", "t"), true)
            .await
            .unwrap_err();
        assert_eq!(err.schema, "working");
        assert_eq!(err.operation, "insert");
        assert_eq!(err.source.code.as_deref(), Some("42501"));
    }
}
