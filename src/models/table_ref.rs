use serde::{Deserialize, Serialize};
use std::fmt;

use super::Dialect;
use crate::analysis::identifier::requote;

/// Normalized reference to a table
///
/// All parts are stored in canonical form, so two references name the same
/// table exactly when they compare equal. `server` and `database` are only
/// set when the source text qualified them explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            server: None,
            database: None,
            schema: schema.into(),
            table: table.into(),
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    /// Same location, different table name
    pub fn renamed(&self, table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..self.clone()
        }
    }

    /// The same table without its server and database parts
    pub fn local(&self) -> Self {
        Self::new(self.schema.clone(), self.table.clone())
    }

    /// Schema and table match, and every qualifier set on both sides agrees
    pub fn same_table(&self, other: &TableRef) -> bool {
        fn agree(a: &Option<String>, b: &Option<String>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
        }
        self.schema == other.schema
            && self.table == other.table
            && agree(&self.database, &other.database)
            && agree(&self.server, &other.server)
    }

    /// Re-quoted dotted name safe to embed in a statement for `dialect`
    pub fn qualified(&self, dialect: Dialect) -> String {
        let mut parts = Vec::with_capacity(4);
        if let Some(server) = &self.server {
            parts.push(requote(server, dialect));
        }
        if let Some(database) = &self.database {
            parts.push(requote(database, dialect));
        }
        parts.push(requote(&self.schema, dialect));
        parts.push(requote(&self.table, dialect));
        parts.join(".")
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(server) = &self.server {
            write!(f, "{}.", server)?;
        }
        if let Some(database) = &self.database {
            write!(f, "{}.", database)?;
        }
        write!(f, "{}.{}", self.schema, self.table)
    }
}
