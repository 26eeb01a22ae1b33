// Per-dialect SQL used by the session, the log synchronizer and executors
use crate::analysis::identifier::requote;
use crate::models::{Dialect, QuoteStyle, SqlValue, Statement, StatementBuilder, TableRef};

/// Column names the catalog statements alias their answers to
pub const PRESENT_COLUMN: &str = "present";
pub const SCHEMA_COLUMN: &str = "schema_name";
pub const TABLE_SCHEMA_COLUMN: &str = "table_schema";
pub const TABLE_NAME_COLUMN: &str = "table_name";
pub const INDEX_NAME_COLUMN: &str = "index_name";

struct LogColumnTypes {
    id: &'static str,
    text: &'static str,
    timestamp: &'static str,
}

/// Statement templates for one dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialectProfile {
    dialect: Dialect,
}

impl DialectProfile {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn quote_style(&self) -> QuoteStyle {
        self.dialect.quote_style()
    }

    pub fn default_schema(&self) -> &'static str {
        self.dialect.fallback_schema()
    }

    fn builder(&self) -> StatementBuilder {
        StatementBuilder::new(self.dialect)
    }

    fn log_column_types(&self) -> LogColumnTypes {
        match self.dialect {
            Dialect::Pg => LogColumnTypes {
                id: "SERIAL PRIMARY KEY",
                text: "VARCHAR(255)",
                timestamp: "TIMESTAMP",
            },
            Dialect::Ms => LogColumnTypes {
                id: "INT IDENTITY(1,1) PRIMARY KEY",
                text: "VARCHAR(255)",
                timestamp: "DATETIME",
            },
            // Synapse dedicated pools reject PRIMARY KEY without NOT ENFORCED
            Dialect::Azure => LogColumnTypes {
                id: "INT IDENTITY(1,1) NOT NULL",
                text: "VARCHAR(255)",
                timestamp: "DATETIME2",
            },
        }
    }

    /// Dotted, quoted name of a table in the session's own database
    pub fn local_name(&self, schema: &str, table: &str) -> String {
        format!("{}.{}", requote(schema, self.dialect), requote(table, self.dialect))
    }

    /// Drop `table`, succeeding when it is already gone
    pub fn drop_table_if_exists(&self, table: &TableRef) -> Statement {
        let qualified = table.qualified(self.dialect);
        match self.dialect {
            Dialect::Pg => Statement::raw(format!("DROP TABLE IF EXISTS {}", qualified)),
            Dialect::Ms | Dialect::Azure => self
                .builder()
                .sql("IF OBJECT_ID(")
                .bind(SqlValue::Text(self.object_id_name(table)))
                .sql(&format!(", 'U') IS NOT NULL DROP TABLE {}", qualified))
                .build(),
        }
    }

    /// Catalog probe answering in a `present` column
    pub fn table_exists(&self, table: &TableRef) -> Statement {
        match self.dialect {
            // pg_tables over information_schema: its columns are `name`, not a domain
            Dialect::Pg => self
                .builder()
                .sql("SELECT EXISTS (SELECT 1 FROM pg_tables WHERE schemaname = ")
                .bind(SqlValue::Text(table.schema.clone()))
                .sql(" AND tablename = ")
                .bind(SqlValue::Text(table.table.clone()))
                .sql(&format!(") AS {}", PRESENT_COLUMN))
                .build(),
            Dialect::Ms | Dialect::Azure => self
                .builder()
                .sql("SELECT CASE WHEN OBJECT_ID(")
                .bind(SqlValue::Text(self.object_id_name(table)))
                .sql(&format!(", 'U') IS NOT NULL THEN 1 ELSE 0 END AS {}", PRESENT_COLUMN))
                .build(),
        }
    }

    /// Schema unqualified names resolve to, in a `schema_name` column
    pub fn current_schema(&self) -> Statement {
        let function = match self.dialect {
            Dialect::Pg => "current_schema()",
            Dialect::Ms | Dialect::Azure => "SCHEMA_NAME()",
        };
        Statement::raw(format!("SELECT {} AS {}", function, SCHEMA_COLUMN))
    }

    pub fn create_log_table(&self, schema: &str, log_name: &str) -> Statement {
        let types = self.log_column_types();
        Statement::raw(format!(
            "CREATE TABLE {} (tbl_id {}, table_owner {text}, table_schema {text}, table_name {text}, created_on {ts}, expires {ts})",
            self.local_name(schema, log_name),
            types.id,
            text = types.text,
            ts = types.timestamp,
        ))
    }

    /// Every schema holding a table called `log_name`
    pub fn schemas_with_log(&self, log_name: &str) -> Statement {
        let lookup = match self.dialect {
            Dialect::Pg => "SELECT DISTINCT schemaname AS {} FROM pg_tables WHERE tablename = ",
            Dialect::Ms | Dialect::Azure => {
                "SELECT DISTINCT table_schema AS {} FROM information_schema.tables WHERE table_name = "
            }
        };
        self.builder()
            .sql(&lookup.replace("{}", TABLE_SCHEMA_COLUMN))
            .bind(SqlValue::Text(log_name.to_string()))
            .build()
    }

    /// Index names defined on `table`
    pub fn list_indexes(&self, table: &TableRef) -> Statement {
        match self.dialect {
            Dialect::Pg => self
                .builder()
                .sql(&format!("SELECT indexname AS {} FROM pg_indexes WHERE schemaname = ", INDEX_NAME_COLUMN))
                .bind(SqlValue::Text(table.schema.clone()))
                .sql(" AND tablename = ")
                .bind(SqlValue::Text(table.table.clone()))
                .build(),
            Dialect::Ms | Dialect::Azure => self
                .builder()
                .sql(&format!(
                    "SELECT name AS {} FROM sys.indexes WHERE name IS NOT NULL AND object_id = OBJECT_ID(",
                    INDEX_NAME_COLUMN
                ))
                .bind(SqlValue::Text(self.object_id_name(table)))
                .sql(")")
                .build(),
        }
    }

    pub fn rename_index(&self, table: &TableRef, index: &str, new_index: &str) -> Statement {
        match self.dialect {
            Dialect::Pg => Statement::raw(format!(
                "ALTER INDEX {} RENAME TO {}",
                self.local_name(&table.schema, index),
                requote(new_index, self.dialect)
            )),
            Dialect::Ms | Dialect::Azure => self
                .builder()
                .sql("EXEC sp_rename ")
                .bind(SqlValue::Text(format!(
                    "{}.{}",
                    self.local_name(&table.schema, &table.table),
                    requote(index, self.dialect)
                )))
                .sql(", ")
                .bind(SqlValue::Text(new_index.to_string()))
                .sql(", 'INDEX'")
                .build(),
        }
    }

    /// Name passed to `OBJECT_ID`, without the server part
    fn object_id_name(&self, table: &TableRef) -> String {
        let local = self.local_name(&table.schema, &table.table);
        match &table.database {
            Some(database) => format!("{}.{}", requote(database, self.dialect), local),
            None => local,
        }
    }
}

impl From<Dialect> for DialectProfile {
    fn from(dialect: Dialect) -> Self {
        Self::new(dialect)
    }
}
