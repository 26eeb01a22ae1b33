use serde::{Deserialize, Serialize};

use super::Dialect;

pub const DEFAULT_EXPIRATION_DAYS: i64 = 7;
pub const DEFAULT_ARCHIVE_SCHEMA: &str = "archive";

/// Everything a session needs to know about its caller
///
/// Built by the caller, or from [`Config`](crate::config::Config), and handed
/// to the session explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub dialect: Dialect,
    /// Owner recorded in log rows; also names the log table
    pub user: String,
    /// Overrides the schema reported by the database
    pub default_schema: Option<String>,
    pub expiration_days: i64,
    pub archive_schema: String,
    /// Never log tables created in `archive_schema`
    pub treat_archive_schema_as_permanent: bool,
    /// Purge and reconcile logs when the session opens
    pub clean_logs_on_open: bool,
}

impl SessionContext {
    pub fn new(dialect: Dialect, user: impl Into<String>) -> Self {
        Self {
            dialect,
            user: user.into(),
            default_schema: None,
            expiration_days: DEFAULT_EXPIRATION_DAYS,
            archive_schema: DEFAULT_ARCHIVE_SCHEMA.to_string(),
            treat_archive_schema_as_permanent: true,
            clean_logs_on_open: true,
        }
    }

    pub fn with_default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = Some(schema.into());
        self
    }

    pub fn with_expiration_days(mut self, days: i64) -> Self {
        self.expiration_days = days;
        self
    }

    pub fn with_clean_logs_on_open(mut self, clean: bool) -> Self {
        self.clean_logs_on_open = clean;
        self
    }

    /// Schema excluded from logging, if any
    pub fn permanent_schema(&self) -> Option<&str> {
        self.treat_archive_schema_as_permanent
            .then_some(self.archive_schema.as_str())
    }
}
