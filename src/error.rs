use thiserror::Error;

/// A dotted table reference that cannot be split into 1 to 4 parts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid table reference '{reference}': {reason}")]
pub struct ParseError {
    pub reference: String,
    pub reason: String,
}

impl ParseError {
    pub fn new(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            reason: reason.into(),
        }
    }
}

/// Failure reported by the executor for one statement
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Statement failed{}: {message}", code_suffix(.code))]
pub struct StatementError {
    pub message: String,
    /// SQLSTATE or native error number when the backend reports one
    pub code: Option<String>,
}

impl StatementError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// True when the statement failed because the target table is already gone
    pub fn is_missing_table(&self) -> bool {
        if matches!(self.code.as_deref(), Some("42P01") | Some("3701") | Some("208")) {
            return true;
        }
        let message = self.message.to_lowercase();
        message.contains("does not exist")
            || message.contains("cannot drop the table")
            || message.contains("invalid object name")
    }
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_ref().map(|code| format!(" ({})", code)).unwrap_or_default()
}

/// Failure while maintaining a log table
#[derive(Debug, Clone, Error)]
#[error("Log table {operation} failed in schema '{schema}': {source}")]
pub struct LogSyncError {
    pub schema: String,
    pub operation: &'static str,
    #[source]
    pub source: StatementError,
}

/// Error type returned by session operations
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(transparent)]
    Statement(#[from] StatementError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    LogSync(#[from] LogSyncError),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<config::ConfigError> for TrackerError {
    fn from(err: config::ConfigError) -> Self {
        TrackerError::Config(err.to_string())
    }
}

impl From<tokio_postgres::Error> for StatementError {
    fn from(err: tokio_postgres::Error) -> Self {
        match err.as_db_error() {
            Some(db_error) => StatementError::new(db_error.message()).with_code(db_error.code().code()),
            None => StatementError::new(err.to_string()),
        }
    }
}
