// Dotted table reference parsing
//
// `server.db.schema.table`, `db.schema.table`, `schema.table` and `table`,
// where a dot inside a quoted or bracketed part is part of the name.

use super::identifier::canonicalize;
use crate::error::ParseError;
use crate::models::{Dialect, QuoteStyle, TableRef};

/// Split `raw` on the dots that sit outside any quoted span
///
/// Returned parts are trimmed but still carry their quoting.
pub fn split_reference(raw: &str, dialect: Dialect) -> Result<Vec<&str>, ParseError> {
    let brackets = dialect.quote_style() == QuoteStyle::Bracket;
    let mut parts = Vec::new();
    let mut start = 0usize;
    let mut in_quotes = false;
    let mut in_brackets = false;
    let mut chars = raw.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        match ch {
            '"' if !in_brackets => in_quotes = !in_quotes,
            '[' if brackets && !in_quotes && !in_brackets => in_brackets = true,
            ']' if in_brackets => {
                if matches!(chars.peek(), Some((_, ']'))) {
                    chars.next();
                } else {
                    in_brackets = false;
                }
            }
            '.' if !in_quotes && !in_brackets => {
                parts.push(raw[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }

    if in_quotes || in_brackets {
        return Err(ParseError::new(raw, "unterminated quoted identifier"));
    }
    parts.push(raw[start..].trim());
    Ok(parts)
}

/// Parse a dotted reference into a canonical [`TableRef`]
///
/// A bare table name lands in `default_schema`. SQL Server family names may
/// leave the schema empty (`db..table`), which also means the default schema.
pub fn parse_table_ref(
    raw: &str,
    default_schema: &str,
    dialect: Dialect,
) -> Result<TableRef, ParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ParseError::new(raw, "empty reference"));
    }

    let parts = split_reference(trimmed, dialect)?;
    if parts.len() > 4 {
        return Err(ParseError::new(
            raw,
            format!("{} dot-separated parts, at most 4 allowed", parts.len()),
        ));
    }

    let last = parts.len() - 1;
    for (idx, part) in parts.iter().enumerate() {
        let default_schema_slot = dialect.is_ms_family() && parts.len() >= 3 && idx == last - 1;
        if part.is_empty() && !default_schema_slot {
            return Err(ParseError::new(raw, "empty name part"));
        }
    }

    let canon = |part: &str| canonicalize(part, dialect);
    let schema_or_default = |part: &str| {
        if part.is_empty() {
            canonicalize(default_schema, dialect)
        } else {
            canon(part)
        }
    };

    let table = match parts.as_slice() {
        [table] => TableRef::new(canonicalize(default_schema, dialect), canon(table)),
        [schema, table] => TableRef::new(canon(schema), canon(table)),
        [database, schema, table] => {
            TableRef::new(schema_or_default(schema), canon(table)).with_database(canon(database))
        }
        [server, database, schema, table] => TableRef::new(schema_or_default(schema), canon(table))
            .with_database(canon(database))
            .with_server(canon(server)),
        _ => return Err(ParseError::new(raw, "no name parts")),
    };

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::identifier::requote;

    #[test]
    fn test_single_part_uses_default_schema() {
        let table = parse_table_ref("Test", "public", Dialect::Pg).unwrap();
        assert_eq!(table, TableRef::new("public", "test"));
    }

    #[test]
    fn test_four_parts() {
        let table = parse_table_ref("dotdevgissql01.RISCRASHDATA.dbo.test", "dbo", Dialect::Ms).unwrap();
        assert_eq!(
            table,
            TableRef::new("dbo", "test")
                .with_database("riscrashdata")
                .with_server("dotdevgissql01")
        );
    }

    #[test]
    fn test_dots_inside_quotes_are_not_separators() {
        let table = parse_table_ref("\"my.schema\".\"table.name\"", "public", Dialect::Pg).unwrap();
        assert_eq!(table, TableRef::new("my.schema", "table.name"));

        let table = parse_table_ref("[my.schema].[Table.Name]", "dbo", Dialect::Ms).unwrap();
        assert_eq!(table, TableRef::new("my.schema", "Table.Name"));
    }

    #[test]
    fn test_escaped_bracket_inside_brackets() {
        let parts = split_reference("[a]].b].c", Dialect::Ms).unwrap();
        assert_eq!(parts, vec!["[a]].b]", "c"]);
    }

    #[test]
    fn test_ms_empty_schema_means_default() {
        let table = parse_table_ref("riscrashdata..node", "dbo", Dialect::Ms).unwrap();
        assert_eq!(table, TableRef::new("dbo", "node").with_database("riscrashdata"));
    }

    #[test]
    fn test_malformed_references() {
        assert!(parse_table_ref("", "public", Dialect::Pg).is_err());
        assert!(parse_table_ref("a.b.c.d.e", "public", Dialect::Pg).is_err());
        assert!(parse_table_ref("a..b", "public", Dialect::Pg).is_err());
        assert!(parse_table_ref("schema.", "dbo", Dialect::Ms).is_err());
        assert!(parse_table_ref("\"open.table", "public", Dialect::Pg).is_err());
    }

    #[test]
    fn test_requoted_parts_round_trip() {
        let cases = [
            (Dialect::Pg, TableRef::new("working", "Test")),
            (Dialect::Pg, TableRef::new("my schema", "t.1")),
            (Dialect::Ms, TableRef::new("dbo", "Node")),
            (Dialect::Azure, TableRef::new("stage", "a]b")),
        ];
        for (dialect, table) in cases {
            let raw = format!("{}.{}", requote(&table.schema, dialect), requote(&table.table, dialect));
            let parsed = parse_table_ref(&raw, "ignored", dialect).unwrap();
            assert_eq!(parsed, table, "{}", raw);
        }
    }
}
