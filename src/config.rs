use serde::Deserialize;
use std::env;

use crate::error::TrackerError;
use crate::models::{Dialect, SessionContext, DEFAULT_ARCHIVE_SCHEMA, DEFAULT_EXPIRATION_DAYS};
use crate::services::url_user;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub tracking: TrackingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub dialect: String,
    /// Empty means the user name in `url`
    pub user: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    pub expiration_days: i64,
    pub archive_schema: String,
    pub treat_archive_schema_as_permanent: bool,
    pub clean_logs_on_open: bool,
    /// Empty means ask the database
    pub default_schema: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// Environment variable -> config key
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("DATABASE_URL", "database.url"),
    ("DB_DIALECT", "database.dialect"),
    ("DB_USER", "database.user"),
    ("QUERY_TIMEOUT_SECS", "database.timeout_secs"),
    ("TRACKER_EXPIRATION_DAYS", "tracking.expiration_days"),
    ("TRACKER_ARCHIVE_SCHEMA", "tracking.archive_schema"),
    ("TRACKER_ARCHIVE_PERMANENT", "tracking.treat_archive_schema_as_permanent"),
    ("TRACKER_CLEAN_LOGS_ON_OPEN", "tracking.clean_logs_on_open"),
    ("TRACKER_DEFAULT_SCHEMA", "tracking.default_schema"),
    ("RUST_LOG", "logging.level"),
];

impl Config {
    pub fn from_env() -> Result<Self, TrackerError> {
        // Try to load from .env file
        let _ = dotenv::dotenv();
        Self::load(|key| env::var(key).ok())
    }

    /// Build from defaults overridden by whatever `lookup` returns
    pub fn load<F>(lookup: F) -> Result<Self, TrackerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = config::Config::builder()
            .set_default("database.url", "postgresql://localhost/postgres")?
            .set_default("database.dialect", "pg")?
            .set_default("database.user", "")?
            .set_default("database.timeout_secs", 300)?
            .set_default("tracking.expiration_days", DEFAULT_EXPIRATION_DAYS)?
            .set_default("tracking.archive_schema", DEFAULT_ARCHIVE_SCHEMA)?
            .set_default("tracking.treat_archive_schema_as_permanent", true)?
            .set_default("tracking.clean_logs_on_open", true)?
            .set_default("tracking.default_schema", "")?
            .set_default("logging.level", "info")?;

        for (var, key) in ENV_OVERRIDES {
            if let Some(value) = lookup(var) {
                builder = builder.set_override(*key, value)?;
            }
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), TrackerError> {
        self.dialect()?;
        if self.tracking.expiration_days < 0 {
            return Err(TrackerError::Config(format!(
                "tracking.expiration_days must not be negative (got {})",
                self.tracking.expiration_days
            )));
        }
        Ok(())
    }

    pub fn dialect(&self) -> Result<Dialect, TrackerError> {
        self.database.dialect.parse().map_err(TrackerError::Config)
    }

    /// Configured user, else the user name in the connection URL
    pub fn user(&self) -> Result<String, TrackerError> {
        let user = self.database.user.trim();
        if !user.is_empty() {
            return Ok(user.to_string());
        }
        url_user(&self.database.url).ok_or_else(|| {
            TrackerError::Config("No user: set DB_USER or put a user name in DATABASE_URL".to_string())
        })
    }

    pub fn session_context(&self) -> Result<SessionContext, TrackerError> {
        let default_schema = self.tracking.default_schema.trim();
        Ok(SessionContext {
            dialect: self.dialect()?,
            user: self.user()?,
            default_schema: (!default_schema.is_empty()).then(|| default_schema.to_string()),
            expiration_days: self.tracking.expiration_days,
            archive_schema: self.tracking.archive_schema.clone(),
            treat_archive_schema_as_permanent: self.tracking.treat_archive_schema_as_permanent,
            clean_logs_on_open: self.tracking.clean_logs_on_open,
        })
    }
}
