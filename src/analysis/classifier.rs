// Statement classifier
//
// Finds the tables a script creates, drops and renames without executing or
// parsing it. The whole script is scanned as one string; comments,
// dollar-quoted bodies and routine bodies are blanked first so nothing inside
// them can match. When a construct is ambiguous the detectors skip it: a
// missed table only escapes expiry, a phantom one corrupts the bookkeeping.

use regex::Captures;

use super::identifier::canonicalize;
use super::patterns::{patterns_for, PatternSet, RenameForm, FROM_RE, STATEMENT_KEYWORD_RE};
use super::reference::{parse_table_ref, split_reference};
use super::scanner::{blank_spans, mask_comments, mask_comments_and_strings, routine_body_spans};
use crate::error::ParseError;
use crate::models::{Classification, Dialect, TableEvent, TableRef};

/// Classify `script` for `dialect`, resolving bare names into `default_schema`
///
/// Fails only when a matched reference has a malformed shape (for example
/// five dotted parts); unrecognised statements are simply not reported.
pub fn classify(
    script: &str,
    default_schema: &str,
    dialect: Dialect,
) -> Result<Classification, ParseError> {
    let texts = MaskedScript::new(script, dialect);
    let patterns = patterns_for(dialect);
    let ctx = DetectContext {
        patterns,
        default_schema,
        dialect,
    };

    let mut events = Vec::new();
    ctx.detect_creates(&texts.code, &mut events)?;
    ctx.detect_select_into(&texts.code, &mut events)?;
    ctx.detect_drops(&texts.code, &mut events)?;
    ctx.detect_renames(&texts, &mut events)?;

    let classification = Classification::from_events(events);
    tracing::debug!(
        dialect = %dialect,
        created = classification.created().len(),
        dropped = classification.dropped().len(),
        renamed = classification.renamed().len(),
        "Classified script"
    );
    Ok(classification)
}

/// Tables a script creates, in order of appearance
pub fn query_creates_table(
    script: &str,
    default_schema: &str,
    dialect: Dialect,
) -> Result<Vec<TableRef>, ParseError> {
    Ok(classify(script, default_schema, dialect)?.created())
}

/// Tables a script drops, in order of appearance
pub fn query_drops_table(
    script: &str,
    default_schema: &str,
    dialect: Dialect,
) -> Result<Vec<TableRef>, ParseError> {
    Ok(classify(script, default_schema, dialect)?.dropped())
}

/// New name -> old name for every table rename in a script
pub fn query_renames_table(
    script: &str,
    default_schema: &str,
    dialect: Dialect,
) -> Result<indexmap::IndexMap<TableRef, TableRef>, ParseError> {
    Ok(classify(script, default_schema, dialect)?.renamed())
}

/// The script with non-code spans blanked, in two strengths
struct MaskedScript {
    /// Comments, dollar quotes, routine bodies and string literals blanked
    code: String,
    /// Same, but string literals kept (for `sp_rename` arguments)
    with_strings: String,
}

impl MaskedScript {
    fn new(script: &str, dialect: Dialect) -> Self {
        let code = mask_comments_and_strings(script, dialect);
        let spans = routine_body_spans(&code, dialect);
        Self {
            code: blank_spans(&code, &spans),
            with_strings: blank_spans(&mask_comments(script, dialect), &spans),
        }
    }
}

struct DetectContext<'a> {
    patterns: &'static PatternSet,
    default_schema: &'a str,
    dialect: Dialect,
}

impl DetectContext<'_> {
    fn parse(&self, raw: &str) -> Result<TableRef, ParseError> {
        parse_table_ref(raw, self.default_schema, self.dialect)
    }

    fn detect_creates(&self, code: &str, events: &mut Vec<(usize, TableEvent)>) -> Result<(), ParseError> {
        for caps in self.patterns.create_table.captures_iter(code) {
            if caps.name("temp").is_some() {
                continue;
            }
            let Some(raw) = caps.name("ref") else { continue };
            if is_session_temp(raw.as_str(), self.dialect)? {
                continue;
            }
            let table = self.parse(raw.as_str())?;
            events.push((match_start(&caps), TableEvent::Created { table }));
        }
        Ok(())
    }

    fn detect_select_into(&self, code: &str, events: &mut Vec<(usize, TableEvent)>) -> Result<(), ParseError> {
        let keywords: Vec<(usize, String)> = STATEMENT_KEYWORD_RE
            .find_iter(code)
            .map(|m| (m.start(), m.as_str().to_ascii_lowercase()))
            .collect();

        for caps in self.patterns.select_into.captures_iter(code) {
            let into_start = match_start(&caps);
            if caps.name("temp").is_some() {
                continue;
            }
            let Some(raw) = caps.name("ref") else { continue };

            // nearest statement keyword before INTO must be SELECT
            let owner = keywords
                .iter()
                .take_while(|(pos, _)| *pos < into_start)
                .last()
                .map(|(_, word)| word.as_str());
            if owner != Some("select") {
                continue;
            }

            let rest = &code[raw.end()..];
            let statement_rest = rest.split(';').next().unwrap_or(rest);
            if !FROM_RE.is_match(statement_rest) {
                continue;
            }

            if is_session_temp(raw.as_str(), self.dialect)? {
                continue;
            }
            let table = self.parse(raw.as_str())?;
            events.push((into_start, TableEvent::Created { table }));
        }
        Ok(())
    }

    fn detect_drops(&self, code: &str, events: &mut Vec<(usize, TableEvent)>) -> Result<(), ParseError> {
        for caps in self.patterns.drop_table.captures_iter(code) {
            let Some(refs) = caps.name("refs") else { continue };
            for item in self.patterns.table_ref.find_iter(refs.as_str()) {
                if is_session_temp(item.as_str(), self.dialect)? {
                    continue;
                }
                let table = self.parse(item.as_str())?;
                events.push((refs.start() + item.start(), TableEvent::Dropped { table }));
            }
        }
        Ok(())
    }

    fn detect_renames(&self, texts: &MaskedScript, events: &mut Vec<(usize, TableEvent)>) -> Result<(), ParseError> {
        for pattern in &self.patterns.renames {
            let haystack = match pattern.form {
                RenameForm::SpRename => texts.with_strings.as_str(),
                RenameForm::AlterTable | RenameForm::RenameObject => texts.code.as_str(),
            };

            for caps in pattern.regex.captures_iter(haystack) {
                let start = match_start(&caps);
                // the keyword itself must be live code, not text inside a literal
                if texts.code.as_bytes().get(start) != haystack.as_bytes().get(start) {
                    continue;
                }
                let (Some(old), Some(new)) = (caps.name("old"), caps.name("new")) else {
                    continue;
                };

                let (old_raw, new_raw) = match pattern.form {
                    RenameForm::SpRename => {
                        // any @objtype argument (COLUMN, INDEX, OBJECT, ...) means not a table
                        if let Some(objtype) = caps.name("objtype") {
                            let kind = quoted_inner(objtype.as_str());
                            if !kind.trim().is_empty() {
                                tracing::debug!(objtype = %kind, "Skipping non-table sp_rename");
                                continue;
                            }
                        }
                        (old.as_str().replace("''", "'"), new.as_str().replace("''", "'"))
                    }
                    RenameForm::AlterTable | RenameForm::RenameObject => {
                        (old.as_str().to_string(), new.as_str().to_string())
                    }
                };

                if is_session_temp(&old_raw, self.dialect)? {
                    continue;
                }
                // renames stay inside one database, so the pair names schema and table only
                let from = self.parse(&old_raw)?.local();
                let to = from.renamed(canonicalize(&new_raw, self.dialect));
                events.push((start, TableEvent::Renamed { from, to }));
            }
        }
        Ok(())
    }
}

/// Text between the first and last single quote
fn quoted_inner(literal: &str) -> &str {
    match (literal.find('\''), literal.rfind('\'')) {
        (Some(open), Some(close)) if close > open => &literal[open + 1..close],
        _ => "",
    }
}

fn match_start(caps: &Captures<'_>) -> usize {
    caps.get(0).map(|m| m.start()).unwrap_or(0)
}

/// `#local` and `##global` SQL Server temp tables are never tracked
fn is_session_temp(raw: &str, dialect: Dialect) -> Result<bool, ParseError> {
    if !dialect.is_ms_family() {
        return Ok(false);
    }
    let parts = split_reference(raw.trim(), dialect)?;
    Ok(parts.last().is_some_and(|table| {
        table
            .trim_start_matches(['[', '"'])
            .starts_with('#')
    }))
}
