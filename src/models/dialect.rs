// SQL dialect selection
//
// A dialect picks the identifier quoting, case folding, DDL vocabulary and
// default schema used when analysing and generating SQL for a backend.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported backend SQL flavors
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// PostgreSQL family
    Pg,
    /// SQL Server family
    Ms,
    /// Azure Synapse variant of SQL Server
    Azure,
}

/// How a dialect quotes identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStyle {
    /// `"name"`
    DoubleQuote,
    /// `[name]`, with `"name"` also accepted
    Bracket,
}

impl Dialect {
    /// Get the string representation of the dialect
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Pg => "pg",
            Dialect::Ms => "ms",
            Dialect::Azure => "azure",
        }
    }

    pub fn quote_style(&self) -> QuoteStyle {
        match self {
            Dialect::Pg => QuoteStyle::DoubleQuote,
            Dialect::Ms | Dialect::Azure => QuoteStyle::Bracket,
        }
    }

    /// True for the SQL Server family (MS and AZURE)
    pub fn is_ms_family(&self) -> bool {
        matches!(self, Dialect::Ms | Dialect::Azure)
    }

    /// Schema a bare table name resolves to when the session does not say otherwise
    pub fn fallback_schema(&self) -> &'static str {
        match self {
            Dialect::Pg => "public",
            Dialect::Ms | Dialect::Azure => "dbo",
        }
    }

    /// Placeholder for the `index`-th (1-based) bound parameter
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Pg => format!("${}", index),
            Dialect::Ms | Dialect::Azure => format!("@P{}", index),
        }
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pg" | "postgres" | "postgresql" => Ok(Dialect::Pg),
            "ms" | "mssql" | "sqlserver" => Ok(Dialect::Ms),
            "azure" | "synapse" => Ok(Dialect::Azure),
            _ => Err(format!("Unsupported dialect: {}", s)),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
