// Identifier canonicalization
//
// Every "is this the same table" comparison goes through `canonicalize`:
// unquoted identifiers fold to lowercase, quoted identifiers keep their case
// and lose their quote characters.

use crate::models::{Dialect, QuoteStyle};

/// Words PostgreSQL will not accept as bare identifiers
const PG_RESERVED: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric", "both",
    "case", "cast", "check", "collate", "column", "constraint", "create", "current_catalog",
    "current_date", "current_role", "current_time", "current_timestamp", "current_user",
    "default", "deferrable", "desc", "distinct", "do", "else", "end", "except", "false",
    "fetch", "for", "foreign", "from", "grant", "group", "having", "in", "initially",
    "intersect", "into", "lateral", "leading", "limit", "localtime", "localtimestamp", "not",
    "null", "offset", "on", "only", "or", "order", "placing", "primary", "references",
    "returning", "select", "session_user", "some", "symmetric", "table", "then", "to",
    "trailing", "true", "union", "unique", "user", "using", "variadic", "when", "where",
    "window", "with",
];

/// Canonical form of a raw identifier token for `dialect`
///
/// Empty input is returned unchanged.
pub fn canonicalize(raw: &str, dialect: Dialect) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return raw.to_string();
    }

    match dialect.quote_style() {
        QuoteStyle::DoubleQuote => match strip_double_quotes(trimmed) {
            Some(inner) => inner,
            None => trimmed.to_lowercase(),
        },
        QuoteStyle::Bracket => {
            // `[x]`, `"x"`, `["x"]` and `"[x]"` all strip to x
            let mut name = trimmed.to_string();
            let mut quoted = false;
            for _ in 0..2 {
                if let Some(inner) = strip_brackets(&name) {
                    name = inner;
                } else if let Some(inner) = strip_double_quotes(&name) {
                    name = inner;
                } else {
                    break;
                }
                quoted = true;
            }
            if quoted {
                name
            } else {
                name.to_lowercase()
            }
        }
    }
}

/// Quote a canonical identifier so it can be embedded in a new statement
///
/// The SQL Server family always brackets. PostgreSQL quotes only names that
/// would not survive case folding or are not plain identifiers.
pub fn requote(canonical: &str, dialect: Dialect) -> String {
    match dialect.quote_style() {
        QuoteStyle::Bracket => format!("[{}]", canonical.replace(']', "]]")),
        QuoteStyle::DoubleQuote => {
            if is_plain_pg_identifier(canonical) {
                canonical.to_string()
            } else {
                format!("\"{}\"", canonical.replace('"', "\"\""))
            }
        }
    }
}

/// True when `raw` carries quoting for `dialect`
pub fn is_quoted(raw: &str, dialect: Dialect) -> bool {
    let raw = raw.trim();
    match dialect.quote_style() {
        QuoteStyle::DoubleQuote => strip_double_quotes(raw).is_some(),
        QuoteStyle::Bracket => strip_brackets(raw).is_some() || strip_double_quotes(raw).is_some(),
    }
}

fn is_plain_pg_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_');
    starts_ok
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '$')
        && !PG_RESERVED.contains(&name)
}

fn strip_double_quotes(raw: &str) -> Option<String> {
    let inner = raw.strip_prefix('"')?.strip_suffix('"')?;
    Some(inner.replace("\"\"", "\""))
}

fn strip_brackets(raw: &str) -> Option<String> {
    let inner = raw.strip_prefix('[')?.strip_suffix(']')?;
    Some(inner.replace("]]", "]"))
}
