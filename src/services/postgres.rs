// PostgreSQL executor over a pooled tokio-postgres client
use chrono::NaiveDateTime;
use deadpool_postgres::{Config as PgConfig, ManagerConfig, Object, Pool, PoolConfig, RecyclingMethod, Runtime};
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant};
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row, SimpleQueryMessage};
use url::Url;

use crate::error::{StatementError, TrackerError};
use crate::models::{Dialect, QueryResult, SqlValue, Statement, TableRef};
use crate::services::executor::{is_truthy, Executor};
use crate::services::profile::{DialectProfile, PRESENT_COLUMN, SCHEMA_COLUMN};

pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Executor holding one pooled client for the lifetime of a session
pub struct PostgresExecutor {
    client: Object,
    profile: DialectProfile,
    timeout: Duration,
}

impl PostgresExecutor {
    /// Connect to `connection_url` through a pool of its own
    pub async fn connect(connection_url: &str, timeout_secs: u64) -> Result<Self, TrackerError> {
        let pool = create_pool(connection_url, DEFAULT_POOL_SIZE)?;
        let executor = Self::from_pool(&pool, timeout_secs).await?;
        tracing::info!("Connected to {}", mask_credentials(connection_url));
        Ok(executor)
    }

    /// Check out one client from `pool` for the lifetime of the executor
    pub async fn from_pool(pool: &Pool, timeout_secs: u64) -> Result<Self, TrackerError> {
        let client = pool
            .get()
            .await
            .map_err(|e| TrackerError::Connection(format!("Failed to get connection from pool: {}", e)))?;

        Ok(Self {
            client,
            profile: DialectProfile::new(Dialect::Pg),
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    async fn run_script(&self, sql: &str) -> Result<Vec<Value>, StatementError> {
        let messages = self.client.simple_query(sql).await?;
        Ok(messages
            .iter()
            .filter_map(|message| match message {
                SimpleQueryMessage::Row(row) => {
                    let mut object = Map::new();
                    for (idx, column) in row.columns().iter().enumerate() {
                        let value = row.get(idx).map(|v| json!(v)).unwrap_or(Value::Null);
                        object.insert(column.name().to_string(), value);
                    }
                    Some(Value::Object(object))
                }
                _ => None,
            })
            .collect())
    }

    async fn run_parameterised(&self, statement: &Statement) -> Result<Vec<Value>, StatementError> {
        let params = bind_params(&statement.params);
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| &**p as &(dyn ToSql + Sync)).collect();
        let rows = self.client.query(statement.sql.as_str(), &refs).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }
}

#[async_trait::async_trait]
impl Executor for PostgresExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Pg
    }

    async fn execute(&self, statement: &Statement) -> Result<QueryResult, StatementError> {
        let start_time = Instant::now();

        // parameterless text may be a multi-statement script
        let outcome = if statement.params.is_empty() {
            tokio::time::timeout(self.timeout, self.run_script(&statement.sql)).await
        } else {
            tokio::time::timeout(self.timeout, self.run_parameterised(statement)).await
        };
        let rows = outcome.map_err(|_| {
            StatementError::new(format!("Query timeout after {} seconds", self.timeout.as_secs()))
        })??;

        Ok(QueryResult::from_rows(rows, start_time.elapsed().as_millis() as u64))
    }

    async fn table_exists(&self, table: &TableRef) -> Result<bool, StatementError> {
        let result = self.execute(&self.profile.table_exists(table)).await?;
        Ok(is_truthy(result.first_value(PRESENT_COLUMN)))
    }

    async fn current_default_schema(&self) -> Result<String, StatementError> {
        let result = self.execute(&self.profile.current_schema()).await?;
        result
            .column_strings(SCHEMA_COLUMN)
            .into_iter()
            .next()
            .ok_or_else(|| StatementError::new("No current schema: search_path is empty"))
    }
}

/// Pool for `connection_url`; no connection is made until a client is requested
pub fn create_pool(connection_url: &str, max_size: usize) -> Result<Pool, TrackerError> {
    validate_url(connection_url)?;

    let mut cfg = PgConfig::new();
    cfg.url = Some(connection_url.to_string());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(PoolConfig::new(max_size));

    tracing::debug!(
        "Creating connection pool for: {} (max_size: {})",
        mask_credentials(connection_url),
        max_size
    );
    cfg.create_pool(Some(Runtime::Tokio1), NoTls).map_err(|e| {
        tracing::error!("Failed to create connection pool: {}", e);
        TrackerError::Connection(format!("Failed to create connection pool: {}", e))
    })
}

/// Connection URL with the password replaced, for logging
pub fn mask_credentials(connection_url: &str) -> String {
    match Url::parse(connection_url) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("***"));
            }
            url.to_string()
        }
        Err(_) => "[invalid-url]".to_string(),
    }
}

/// Reject anything that is not a postgres URL
pub fn validate_url(connection_url: &str) -> Result<(), TrackerError> {
    let url = Url::parse(connection_url)
        .map_err(|e| TrackerError::Validation(format!("Invalid PostgreSQL URL: {}", e)))?;

    if url.scheme() != "postgresql" && url.scheme() != "postgres" {
        return Err(TrackerError::Validation(
            "URL must use postgresql:// or postgres:// scheme".to_string(),
        ));
    }
    Ok(())
}

/// User name in a connection URL, if any
pub fn url_user(connection_url: &str) -> Option<String> {
    let url = Url::parse(connection_url).ok()?;
    let user = url.username();
    (!user.is_empty()).then(|| user.to_string())
}

fn bind_params(params: &[SqlValue]) -> Vec<Box<dyn ToSql + Sync + Send>> {
    params
        .iter()
        .map(|param| -> Box<dyn ToSql + Sync + Send> {
            match param {
                SqlValue::Text(v) => Box::new(v.clone()),
                SqlValue::Int(v) => Box::new(*v),
                SqlValue::Timestamp(v) => Box::new(*v),
            }
        })
        .collect()
}

fn row_to_json(row: &Row) -> Value {
    let mut object = Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = match column.type_().name() {
            "int2" => row.try_get::<_, Option<i16>>(idx).ok().flatten().map(|v| json!(v)),
            "int4" => row.try_get::<_, Option<i32>>(idx).ok().flatten().map(|v| json!(v)),
            "int8" => row.try_get::<_, Option<i64>>(idx).ok().flatten().map(|v| json!(v)),
            "float4" => row.try_get::<_, Option<f32>>(idx).ok().flatten().map(|v| json!(v)),
            "float8" => row.try_get::<_, Option<f64>>(idx).ok().flatten().map(|v| json!(v)),
            "bool" => row.try_get::<_, Option<bool>>(idx).ok().flatten().map(|v| json!(v)),
            "timestamp" => row
                .try_get::<_, Option<NaiveDateTime>>(idx)
                .ok()
                .flatten()
                .map(|v| json!(v.to_string())),
            _ => match row.try_get::<_, Option<String>>(idx) {
                Ok(v) => v.map(|v| json!(v)),
                Err(_) => {
                    tracing::warn!(
                        "Unsupported column type {} for column {}, using NULL",
                        column.type_().name(),
                        column.name()
                    );
                    None
                }
            },
        };
        object.insert(column.name().to_string(), value.unwrap_or(Value::Null));
    }
    Value::Object(object)
}
