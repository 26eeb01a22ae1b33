// Session: executes statements and keeps the table registry and log tables
// in step with what they did.
//
// Every operation takes `&mut self` and awaits each round trip before the next
// is issued; nothing runs concurrently inside one session.

use uuid::Uuid;

use crate::analysis::{canonicalize, classify};
use crate::error::{LogSyncError, TrackerError};
use crate::models::{
    Classification, QueryOptions, QueryResult, SessionContext, SessionState, Statement, TableEvent,
    TableRef,
};
use crate::services::executor::Executor;
use crate::services::index_rename::rename_indexes;
use crate::services::log_sync::{HousekeepingReport, LogTableSynchronizer};
use crate::services::profile::DialectProfile;
use crate::services::registry::TableRegistry;

pub struct Session<E: Executor> {
    id: Uuid,
    ctx: SessionContext,
    default_schema: String,
    executor: E,
    profile: DialectProfile,
    registry: TableRegistry,
    log_sync: LogTableSynchronizer,
    state: SessionState,
}

impl<E: Executor> Session<E> {
    /// Open a session over `executor`
    ///
    /// The default schema comes from the context, or from the database when
    /// the context leaves it unset. With `clean_logs_on_open` the log
    /// housekeeping pass runs before the session is returned; its failures
    /// are logged, not returned.
    pub async fn open(ctx: SessionContext, executor: E) -> Result<Self, TrackerError> {
        if executor.dialect() != ctx.dialect {
            return Err(TrackerError::Validation(format!(
                "Session dialect {} does not match executor dialect {}",
                ctx.dialect,
                executor.dialect()
            )));
        }
        if ctx.user.trim().is_empty() {
            return Err(TrackerError::Validation("Session user must not be empty".to_string()));
        }

        let default_schema = match &ctx.default_schema {
            Some(schema) => canonicalize(schema, ctx.dialect),
            None => canonicalize(&executor.current_default_schema().await?, ctx.dialect),
        };
        let default_schema = if default_schema.trim().is_empty() {
            ctx.dialect.fallback_schema().to_string()
        } else {
            default_schema
        };

        let log_sync = LogTableSynchronizer::new(ctx.dialect, &ctx.user, ctx.expiration_days)
            .with_archive_schema(ctx.permanent_schema().map(|s| canonicalize(s, ctx.dialect)));

        let mut session = Self {
            id: Uuid::new_v4(),
            profile: DialectProfile::new(ctx.dialect),
            ctx,
            default_schema,
            executor,
            registry: TableRegistry::new(),
            log_sync,
            state: SessionState::Idle,
        };

        tracing::info!(
            session = %session.id,
            "Opened {} session for {} (default schema: {})",
            session.ctx.dialect,
            session.ctx.user,
            session.default_schema
        );

        if session.ctx.clean_logs_on_open {
            if let Err(e) = session.clean_logs().await {
                tracing::warn!(session = %session.id, "Log housekeeping on open failed: {}", e);
            }
        }

        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn default_schema(&self) -> &str {
        &self.default_schema
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn log_sync(&self) -> &LogTableSynchronizer {
        &self.log_sync
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    /// Tables this session created and still believes exist, in order
    pub fn tables_created(&self) -> &[TableRef] {
        self.registry.tables_created()
    }

    pub fn tables_dropped(&self) -> &[TableRef] {
        self.registry.tables_dropped()
    }

    /// Execute `sql` and record the tables it touched
    ///
    /// With `strict` a failing statement is returned as an error; otherwise it
    /// is logged and `Ok(None)` returned. Bookkeeping failures on the log
    /// tables never fail the call.
    pub async fn query(
        &mut self,
        sql: &str,
        options: QueryOptions,
    ) -> Result<Option<QueryResult>, TrackerError> {
        self.state = SessionState::Executing;
        tracing::debug!(session = %self.id, "Executing statement ({} bytes)", sql.len());

        let result = match self.executor.execute(&Statement::raw(sql)).await {
            Ok(result) => result,
            Err(e) => {
                self.state = SessionState::Idle;
                if options.strict {
                    tracing::error!(session = %self.id, "Query execution error: {}", e);
                    return Err(e.into());
                }
                tracing::warn!(session = %self.id, "Ignoring failed statement: {}", e);
                return Ok(None);
            }
        };

        if !options.internal {
            self.state = SessionState::PostProcessing;
            let recorded = self.post_process(sql, options.temp).await;
            self.state = SessionState::Idle;
            if let Err(e) = recorded {
                if options.strict {
                    return Err(e);
                }
                tracing::warn!(session = %self.id, "Statement ran but was not tracked: {}", e);
            }
        }

        self.state = SessionState::Idle;
        Ok(Some(result))
    }

    /// Record the effects of a script executed elsewhere
    pub async fn record_statement(&mut self, script: &str) -> Result<Classification, TrackerError> {
        self.state = SessionState::PostProcessing;
        let recorded = self.post_process(script, true).await;
        self.state = SessionState::Idle;
        recorded
    }

    async fn post_process(&mut self, script: &str, temp: bool) -> Result<Classification, TrackerError> {
        let classification = classify(script, &self.default_schema, self.ctx.dialect)?;
        self.registry.begin_statement();

        for event in classification.events() {
            match event {
                TableEvent::Created { table } => {
                    self.registry.record_created(table.clone());
                    if temp {
                        let logged = self.log_sync.track_created(&self.executor, table, true).await;
                        self.warn_on_log_failure(logged);
                    }
                }
                TableEvent::Dropped { table } => {
                    self.registry.record_dropped(table.clone());
                    self.forget_logged(table).await;
                }
                TableEvent::Renamed { from, to } => {
                    self.registry.record_renamed(from.clone(), to.clone());
                    self.apply_rename(from, to).await;
                }
            }
        }

        tracing::debug!(
            session = %self.id,
            "Tracking {} created, {} dropped",
            self.registry.tables_created().len(),
            self.registry.tables_dropped().len()
        );
        Ok(classification)
    }

    async fn apply_rename(&self, from: &TableRef, to: &TableRef) {
        if !is_local(to) {
            return;
        }
        // update before delete, or the delete would remove the row being renamed
        let updated = self
            .log_sync
            .log_update_rename(&self.executor, &to.schema, &from.table, &to.table)
            .await;
        self.warn_on_log_failure(updated);
        self.forget_logged(from).await;

        if let Err(e) = rename_indexes(&self.executor, to, &from.table).await {
            tracing::warn!(session = %self.id, "Index rename for {} failed: {}", to, e);
        }
    }

    async fn forget_logged(&self, table: &TableRef) {
        if !is_local(table) {
            return;
        }
        let deleted = self
            .log_sync
            .log_delete(&self.executor, &table.schema, &table.table)
            .await;
        self.warn_on_log_failure(deleted);
    }

    fn warn_on_log_failure<T>(&self, result: Result<T, LogSyncError>) {
        if let Err(e) = result {
            tracing::warn!(session = %self.id, "{}", e);
        }
    }

    /// Drop every table this session created; returns how many were dropped
    ///
    /// Tables that are already gone are skipped. A table that fails to drop
    /// for any other reason stays tracked so a later call can retry it.
    pub async fn cleanup_new_tables(&mut self) -> Result<usize, TrackerError> {
        let tables = self.registry.take_created();
        let mut dropped = 0;
        let mut kept = Vec::new();

        for table in tables {
            match self.drop_if_present(&table).await {
                Ok(true) => {
                    tracing::info!(session = %self.id, "Dropped {}", table);
                    self.forget_logged(&table).await;
                    self.registry.record_dropped(table);
                    dropped += 1;
                }
                Ok(false) => {
                    tracing::debug!(session = %self.id, "{} already gone", table);
                    self.forget_logged(&table).await;
                }
                Err(e) => {
                    tracing::warn!(session = %self.id, "Failed to drop {}: {}", table, e);
                    kept.push(table);
                }
            }
        }

        for table in kept {
            self.registry.record_created(table);
        }
        Ok(dropped)
    }

    async fn drop_if_present(&self, table: &TableRef) -> Result<bool, TrackerError> {
        let exists = match self.executor.table_exists(table).await {
            Ok(exists) => exists,
            // cannot tell; the drop below tolerates a missing table
            Err(_) => true,
        };
        if !exists {
            return Ok(false);
        }

        match self.executor.execute(&self.profile.drop_table_if_exists(table)).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_missing_table() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Forget every created and dropped table without touching the database
    pub fn reset(&mut self) {
        self.registry.reset();
    }

    /// Purge expired tables and stale rows in every schema holding a log
    pub async fn clean_logs(&mut self) -> Result<HousekeepingReport, TrackerError> {
        let report = self.log_sync.housekeeping(&self.executor).await?;
        if report.purged > 0 || report.reconciled > 0 {
            tracing::info!(
                session = %self.id,
                "Log housekeeping purged {} tables, removed {} stale rows",
                report.purged,
                report.reconciled
            );
        }
        Ok(report)
    }

    pub fn close(self) {
        tracing::debug!(
            session = %self.id,
            "Closing session ({} tables still tracked)",
            self.registry.tables_created().len()
        );
    }
}

/// Log rows are only kept for tables in the session's own database
fn is_local(table: &TableRef) -> bool {
    table.server.is_none() && table.database.is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatementError;
    use crate::models::Dialect;
    use crate::test_support::MockExecutor;
    use serde_json::json;
    use std::sync::Arc;

    const LOG: &str = "__temp_log_table_alice__";

    fn ctx(dialect: Dialect) -> SessionContext {
        SessionContext::new(dialect, "alice").with_clean_logs_on_open(false)
    }

    async fn open(exec: &Arc<MockExecutor>, dialect: Dialect) -> Session<Arc<MockExecutor>> {
        Session::open(ctx(dialect), Arc::clone(exec)).await.unwrap()
    }

    fn t(schema: &str, table: &str) -> TableRef {
        TableRef::new(schema, table)
    }

    #[tokio::test]
    async fn test_open_resolves_default_schema() {
        let exec = Arc::new(MockExecutor::new(Dialect::Pg).with_default_schema("working"));
        let session = open(&exec, Dialect::Pg).await;
        assert_eq!(session.default_schema(), "working");
        assert_eq!(session.state(), SessionState::Idle);

        let session = Session::open(ctx(Dialect::Pg).with_default_schema("Other"), Arc::clone(&exec))
            .await
            .unwrap();
        assert_eq!(session.default_schema(), "other");
    }

    #[tokio::test]
    async fn test_open_canonicalizes_database_schema() {
        let exec = Arc::new(MockExecutor::new(Dialect::Ms).with_default_schema("DBO"));
        let mut session = open(&exec, Dialect::Ms).await;
        assert_eq!(session.default_schema(), "dbo");

        session.query("CREATE TABLE roads (id int)", QueryOptions::default()).await.unwrap();
        assert_eq!(session.tables_created(), &[t("dbo", "roads")]);
    }

    #[tokio::test]
    async fn test_open_rejects_dialect_mismatch() {
        let exec = Arc::new(MockExecutor::new(Dialect::Ms));
        let result = Session::open(ctx(Dialect::Pg), exec).await;
        assert!(matches!(result, Err(TrackerError::Validation(_))));
    }

    #[tokio::test]
    async fn test_open_runs_housekeeping_when_enabled() {
        let exec = Arc::new(MockExecutor::new(Dialect::Pg));
        let _ = Session::open(ctx(Dialect::Pg), Arc::clone(&exec)).await.unwrap();
        assert_eq!(exec.count_matching("AS table_schema FROM"), 0);

        let enabled = ctx(Dialect::Pg).with_clean_logs_on_open(true);
        let _ = Session::open(enabled, Arc::clone(&exec)).await.unwrap();
        assert_eq!(exec.count_matching("AS table_schema FROM"), 1);
    }

    #[tokio::test]
    async fn test_open_survives_housekeeping_failure() {
        let exec = Arc::new(MockExecutor::new(Dialect::Pg));
        exec.fail_on("AS table_schema FROM", StatementError::new("permission denied"));
        let enabled = ctx(Dialect::Pg).with_clean_logs_on_open(true);
        assert!(Session::open(enabled, exec).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_is_tracked_and_logged() {
        let exec = Arc::new(MockExecutor::new(Dialect::Pg));
        let mut session = open(&exec, Dialect::Pg).await;

        let result = session
            .query("CREATE TABLE working.roads (id int)", QueryOptions::default())
            .await
            .unwrap();

        assert!(result.is_some());
        assert_eq!(session.tables_created(), &[t("working", "roads")]);
        assert!(exec.has_table("working", LOG));
        assert_eq!(exec.count_matching("INSERT INTO working.__temp_log_table_alice__"), 1);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_rename_moves_tracking_to_new_name() {
        let exec = Arc::new(MockExecutor::new(Dialect::Pg));
        let mut session = open(&exec, Dialect::Pg).await;

        session.query("CREATE TABLE t (id int)", QueryOptions::default()).await.unwrap();
        session.query("ALTER TABLE t RENAME TO t2", QueryOptions::default()).await.unwrap();

        assert_eq!(session.tables_created(), &[t("public", "t2")]);
        assert!(!session.tables_created().contains(&t("public", "t")));
        assert!(session.tables_dropped().contains(&t("public", "t")));
        assert_eq!(
            session.registry().last_statement_renames().get(&t("public", "t2")),
            Some(&t("public", "t"))
        );
    }

    #[tokio::test]
    async fn test_rename_updates_log_before_deleting_old_row() {
        let exec = Arc::new(MockExecutor::new(Dialect::Pg));
        let mut session = open(&exec, Dialect::Pg).await;

        session.query("CREATE TABLE t (id int)", QueryOptions::default()).await.unwrap();
        session.query("ALTER TABLE t RENAME TO t2", QueryOptions::default()).await.unwrap();

        let executed = exec.executed();
        let update_at = executed.iter().position(|s| s.sql.starts_with("UPDATE")).unwrap();
        let last_delete = executed.iter().rposition(|s| s.sql.starts_with("DELETE FROM")).unwrap();
        assert!(update_at < last_delete);
        assert_eq!(exec.count_matching("FROM pg_indexes"), 1);
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let exec = Arc::new(MockExecutor::new(Dialect::Pg));
        let mut session = open(&exec, Dialect::Pg).await;

        session
            .query("CREATE TABLE a (id int); CREATE TABLE b (id int);", QueryOptions::default())
            .await
            .unwrap();
        exec.remove_table("public", "b");

        let dropped = tokio_test::assert_ok!(session.cleanup_new_tables().await);
        assert_eq!(dropped, 1);
        assert!(session.tables_created().is_empty());
        assert!(!exec.has_table("public", "a"));
        assert!(session.tables_dropped().contains(&t("public", "a")));

        tokio_test::assert_ok!(session.cleanup_new_tables().await);
        assert!(session.tables_created().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_keeps_tables_it_could_not_drop() {
        let exec = Arc::new(MockExecutor::new(Dialect::Pg));
        let mut session = open(&exec, Dialect::Pg).await;

        session.query("CREATE TABLE locked (id int)", QueryOptions::default()).await.unwrap();
        exec.fail_on("DROP TABLE IF EXISTS", StatementError::new("lock timeout").with_code("55P03"));

        assert_eq!(session.cleanup_new_tables().await.unwrap(), 0);
        assert_eq!(session.tables_created(), &[t("public", "locked")]);

        exec.clear_failures();
        assert_eq!(session.cleanup_new_tables().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_strict_and_best_effort_failures() {
        let exec = Arc::new(MockExecutor::new(Dialect::Pg));
        exec.fail_on("broken", StatementError::new("syntax error").with_code("42601"));
        let mut session = open(&exec, Dialect::Pg).await;

        let err = session
            .query("CREATE TABLE broken (", QueryOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::Statement(_)));
        assert_eq!(session.state(), SessionState::Idle);

        let result = session
            .query("CREATE TABLE broken (", QueryOptions::best_effort())
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(session.tables_created().is_empty());
    }

    #[tokio::test]
    async fn test_internal_statements_skip_bookkeeping() {
        let exec = Arc::new(MockExecutor::new(Dialect::Pg));
        let mut session = open(&exec, Dialect::Pg).await;

        session.query("CREATE TABLE scratch (id int)", QueryOptions::internal()).await.unwrap();

        assert!(session.tables_created().is_empty());
        assert_eq!(exec.count_matching("INSERT INTO"), 0);
    }

    #[tokio::test]
    async fn test_permanent_tables_are_tracked_but_not_logged() {
        let exec = Arc::new(MockExecutor::new(Dialect::Pg));
        let mut session = open(&exec, Dialect::Pg).await;

        session.query("CREATE TABLE keep (id int)", QueryOptions::permanent()).await.unwrap();
        session.query("CREATE TABLE archive.old (id int)", QueryOptions::default()).await.unwrap();

        assert_eq!(session.tables_created(), &[t("public", "keep"), t("archive", "old")]);
        assert_eq!(exec.count_matching("INSERT INTO"), 0);
    }

    #[tokio::test]
    async fn test_log_failure_does_not_fail_statement() {
        let exec = Arc::new(MockExecutor::new(Dialect::Pg));
        exec.fail_on("INSERT INTO", StatementError::new("permission denied").with_code("42501"));
        let mut session = open(&exec, Dialect::Pg).await;

        let result = session.query("CREATE TABLE t (id int)", QueryOptions::default()).await;

        assert!(result.unwrap().is_some());
        assert_eq!(session.tables_created(), &[t("public", "t")]);
    }

    #[tokio::test]
    async fn test_drop_in_later_script_untracks_and_unlogs() {
        let exec = Arc::new(MockExecutor::new(Dialect::Pg));
        let mut session = open(&exec, Dialect::Pg).await;

        session.query("CREATE TABLE a (id int)", QueryOptions::default()).await.unwrap();
        session.query("DROP TABLE a", QueryOptions::default()).await.unwrap();

        assert!(session.tables_created().is_empty());
        assert_eq!(session.tables_dropped(), &[t("public", "a")]);
        let last = exec.executed().pop().unwrap();
        assert!(last.sql.starts_with("DELETE FROM public.__temp_log_table_alice__"));
    }

    #[tokio::test]
    async fn test_ms_session_temp_tables_ignored() {
        let exec = Arc::new(MockExecutor::new(Dialect::Ms));
        let mut session = open(&exec, Dialect::Ms).await;

        session.query("CREATE TABLE #temp1 (id int)", QueryOptions::default()).await.unwrap();
        assert!(session.tables_created().is_empty());

        session
            .query("SELECT TOP 10 * INTO dbo.sample FROM dbo.node", QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(session.tables_created(), &[t("dbo", "sample")]);
    }

    #[tokio::test]
    async fn test_ms_database_qualified_sp_rename() {
        let exec = Arc::new(MockExecutor::new(Dialect::Ms));
        let mut session = open(&exec, Dialect::Ms).await;

        session.query("CREATE TABLE dbo.test (id int)", QueryOptions::default()).await.unwrap();
        session
            .query("EXEC sp_rename 'RISCRASHDATA.dbo.test', 'node'", QueryOptions::default())
            .await
            .unwrap();

        assert_eq!(session.tables_created(), &[t("dbo", "node")]);
        assert_eq!(session.tables_dropped(), &[t("dbo", "test")]);
        assert_eq!(exec.count_matching("UPDATE [dbo].[__temp_log_table_alice__]"), 1);
        assert!(exec.has_table("dbo", "node"));
    }

    #[tokio::test]
    async fn test_record_statement_without_executing() {
        let exec = Arc::new(MockExecutor::new(Dialect::Ms));
        let mut session = open(&exec, Dialect::Ms).await;

        let classification = session
            .record_statement("EXEC sp_rename 'RISCRASHDATA.dbo.test', 'node'")
            .await
            .unwrap();

        assert_eq!(classification.renamed().len(), 1);
        assert!(session.tables_dropped()[0].table == "test");
        assert_eq!(exec.count_matching("sp_rename 'RISCRASHDATA"), 0);
    }

    #[tokio::test]
    async fn test_malformed_reference_is_an_error_when_strict() {
        let exec = Arc::new(MockExecutor::new(Dialect::Pg));
        let mut session = open(&exec, Dialect::Pg).await;

        let sql = "CREATE TABLE a.b.c.d.e (id int)";
        let err = session.query(sql, QueryOptions::default()).await.unwrap_err();
        assert!(matches!(err, TrackerError::Parse(_)));

        let result = session.query(sql, QueryOptions::best_effort()).await.unwrap();
        assert!(result.is_some());
        assert!(session.tables_created().is_empty());
    }

    #[tokio::test]
    async fn test_clean_logs_reports_counts() {
        let exec = Arc::new(
            MockExecutor::new(Dialect::Pg)
                .with_table("working", LOG)
                .with_table("working", "expired"),
        );
        exec.respond("AS table_schema FROM", vec![json!({"table_schema": "working"})]);
        exec.respond("WHERE expires <", vec![json!({"table_name": "expired"})]);
        exec.respond(
            "SELECT DISTINCT table_name AS table_name FROM working.__temp_log_table_alice__",
            vec![json!({"table_name": "ghost"})],
        );
        let mut session = open(&exec, Dialect::Pg).await;

        let report = session.clean_logs().await.unwrap();

        assert_eq!(report, HousekeepingReport { purged: 1, reconciled: 1 });
        assert!(!exec.has_table("working", "expired"));
    }

    #[tokio::test]
    async fn test_reset_forgets_everything() {
        let exec = Arc::new(MockExecutor::new(Dialect::Pg));
        let mut session = open(&exec, Dialect::Pg).await;

        session
            .query("CREATE TABLE a (id int); DROP TABLE b;", QueryOptions::default())
            .await
            .unwrap();
        session.reset();

        assert!(session.tables_created().is_empty());
        assert!(session.tables_dropped().is_empty());
        session.close();
    }
}
