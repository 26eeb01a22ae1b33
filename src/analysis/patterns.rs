// Per-dialect DDL vocabulary
//
// One `PatternSet` per dialect; the classifier never branches on the dialect
// itself, it only asks for the set.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::Dialect;

const PG_SEGMENT: &str = r#"(?:"(?:[^"]|"")*"|[\w$]+)"#;
const MS_SEGMENT: &str = r#"(?:"(?:[^"]|"")*"|\[(?:[^\]]|\]\])*\]|[\w$#@]+)"#;

/// How a rename statement spells its two names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameForm {
    /// `ALTER TABLE old RENAME TO new`
    AlterTable,
    /// `EXEC sp_rename 'old', 'new'`; names live inside string literals
    SpRename,
    /// `RENAME OBJECT old TO new`
    RenameObject,
}

#[derive(Debug)]
pub struct RenamePattern {
    pub form: RenameForm,
    /// Captures `old`, `new` and, for `sp_rename`, an optional `objtype`
    pub regex: Regex,
}

#[derive(Debug)]
pub struct PatternSet {
    /// Captures `temp` (present for temporary tables) and `ref`
    pub create_table: Regex,
    /// Captures `temp` and `ref` for `... INTO <ref>`
    pub select_into: Regex,
    /// Captures `refs`, a comma separated list
    pub drop_table: Regex,
    /// One dotted reference, used to split drop lists
    pub table_ref: Regex,
    pub renames: Vec<RenamePattern>,
}

fn reference(segment: &str, allow_empty_part: bool) -> String {
    let dots = if allow_empty_part { r"\.\.?" } else { r"\." };
    format!("{seg}(?:{dots}{seg})*", seg = segment, dots = dots)
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid DDL pattern {}: {}", pattern, e))
}

fn build(dialect: Dialect) -> PatternSet {
    let (segment, allow_empty) = match dialect {
        Dialect::Pg => (PG_SEGMENT, false),
        Dialect::Ms | Dialect::Azure => (MS_SEGMENT, true),
    };
    let table_ref = reference(segment, allow_empty);

    let create_table = compile(&format!(
        r"(?i)\bcreate\s+(?:or\s+replace\s+)?(?:(?:global|local)\s+)?(?:(?P<temp>temp|temporary)\s+|unlogged\s+)?table\s+(?:if\s+not\s+exists\s+)?(?P<ref>{})",
        table_ref
    ));
    let select_into = compile(&format!(
        r"(?i)\binto\s+(?:(?P<temp>temp|temporary)\s+|unlogged\s+)?(?:table\s+)?(?P<ref>{})",
        table_ref
    ));
    let drop_table = compile(&format!(
        r"(?i)\bdrop\s+table\s+(?:if\s+exists\s+)?(?P<refs>{r}(?:\s*,\s*{r})*)",
        r = table_ref
    ));

    let alter_rename = RenamePattern {
        form: RenameForm::AlterTable,
        regex: compile(&format!(
            r"(?i)\balter\s+table\s+(?:if\s+exists\s+)?(?:only\s+)?(?P<old>{})\s+rename\s+to\s+(?P<new>{})",
            table_ref, segment
        )),
    };
    let sp_rename = RenamePattern {
        form: RenameForm::SpRename,
        regex: compile(
            r"(?i)\bsp_rename\s+N?'(?P<old>(?:[^']|'')+)'\s*,\s*N?'(?P<new>(?:[^']|'')+)'(?P<objtype>\s*,\s*N?'(?:[^']|'')*')?",
        ),
    };
    let rename_object = RenamePattern {
        form: RenameForm::RenameObject,
        regex: compile(&format!(
            r"(?i)\brename\s+object(?:\s*::\s*|\s+)(?P<old>{})\s+to\s+(?P<new>{})",
            table_ref, segment
        )),
    };

    let renames = match dialect {
        Dialect::Pg => vec![alter_rename],
        Dialect::Ms => vec![sp_rename],
        Dialect::Azure => vec![sp_rename, rename_object],
    };

    PatternSet {
        create_table,
        select_into,
        drop_table,
        table_ref: compile(&table_ref),
        renames,
    }
}

static PG_PATTERNS: LazyLock<PatternSet> = LazyLock::new(|| build(Dialect::Pg));
static MS_PATTERNS: LazyLock<PatternSet> = LazyLock::new(|| build(Dialect::Ms));
static AZURE_PATTERNS: LazyLock<PatternSet> = LazyLock::new(|| build(Dialect::Azure));

/// Statement-level keywords used to find which statement an `INTO` belongs to
pub static STATEMENT_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?i)\b(?:select|insert|merge|update|delete|into|create|alter|drop|exec|execute|values)\b|;")
});

pub static FROM_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)\bfrom\b"));

pub fn patterns_for(dialect: Dialect) -> &'static PatternSet {
    match dialect {
        Dialect::Pg => &PG_PATTERNS,
        Dialect::Ms => &MS_PATTERNS,
        Dialect::Azure => &AZURE_PATTERNS,
    }
}
