use chrono::{Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of a per-user expiring-tables log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub owner: String,
    pub schema: String,
    pub table: String,
    pub created_on: NaiveDateTime,
    /// `None` marks a permanent entry
    pub expires: Option<NaiveDateTime>,
}

impl LogEntry {
    /// Entry created now, expiring after `expiration_days` when given
    pub fn new(
        owner: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
        expiration_days: Option<i64>,
    ) -> Self {
        let created_on = Utc::now().naive_utc();
        Self {
            owner: owner.into(),
            schema: schema.into(),
            table: table.into(),
            created_on,
            expires: expiration_days.map(|days| created_on + Duration::days(days)),
        }
    }

    pub fn is_expired_at(&self, now: NaiveDateTime) -> bool {
        self.expires.is_some_and(|expires| expires < now)
    }
}

/// Name of the log table for `user`
///
/// Lowercased, with anything outside `[a-z0-9_]` replaced by `_`.
pub fn log_table_name(user: &str) -> String {
    let user: String = user
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    format!("__temp_log_table_{}__", user)
}
