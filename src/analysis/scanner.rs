// Script masking
//
// Produces a copy of a script, byte-for-byte the same length, in which every
// span that is not top-level SQL has been blanked with spaces: line comments,
// block comments, dollar-quoted bodies and routine bodies. Offsets found in
// the masked text are valid offsets into the original script.
//
// Comment rule: outside string literals and quoted identifiers, `--` always
// starts a comment that runs to the end of the line, and `/*` always starts a
// comment that ends at the first `*/` (block comments do not nest). Anything
// inside, semicolons included, is invisible to the detectors.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::{Dialect, QuoteStyle};

static ROUTINE_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bcreate\s+(?:or\s+(?:replace|alter)\s+)?(?:function|procedure|proc|trigger)\b",
    )
    .expect("valid routine header pattern")
});

static BODY_AS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bas\b").expect("valid AS pattern"));

static BLOCK_WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(begin(?:\s+(?:distributed\s+)?tran(?:saction)?\b)?|case|end)\b")
        .expect("valid block keyword pattern")
});

static BATCH_SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^[ \t]*go[ \t]*$").expect("valid batch separator pattern"));

static LEADING_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\w+)").expect("valid leading word pattern"));

/// Blank comments and, for PostgreSQL, dollar-quoted bodies
pub fn mask_comments(script: &str, dialect: Dialect) -> String {
    mask_spans(script, dialect, false, false)
}

/// Like [`mask_comments`], and also blank single-quoted string literals
pub fn mask_comments_and_strings(script: &str, dialect: Dialect) -> String {
    mask_spans(script, dialect, true, false)
}

fn mask_spans(script: &str, dialect: Dialect, strings: bool, identifiers: bool) -> String {
    let bytes = script.as_bytes();
    let mut masked = bytes.to_vec();
    let brackets = dialect.quote_style() == QuoteStyle::Bracket;
    let pg = dialect == Dialect::Pg;
    let len = bytes.len();
    let mut i = 0usize;

    while i < len {
        match bytes[i] {
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                let end = find_byte(bytes, i, b'\n').unwrap_or(len);
                blank(&mut masked, i, end);
                i = end;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = find_seq(bytes, i + 2, b"*/").map(|p| p + 2).unwrap_or(len);
                blank(&mut masked, i, end);
                i = end;
            }
            b'\'' => {
                let end = if pg && is_escape_string(bytes, i) {
                    skip_escape_string(bytes, i)
                } else {
                    skip_quoted(bytes, i, b'\'')
                };
                if strings {
                    blank(&mut masked, i, end);
                }
                i = end;
            }
            b'"' => i = skip_identifier(bytes, &mut masked, i, b'"', identifiers),
            b'[' if brackets => i = skip_identifier(bytes, &mut masked, i, b']', identifiers),
            b'$' if pg => match dollar_tag(bytes, i) {
                Some(tag) => {
                    let body_start = i + tag.len();
                    let end = find_seq(bytes, body_start, tag)
                        .map(|p| p + tag.len())
                        .unwrap_or(len);
                    blank(&mut masked, i, end);
                    i = end;
                }
                None => i += 1,
            },
            _ => i += 1,
        }
    }

    // only whole ASCII-delimited spans were blanked, so this never loses data
    String::from_utf8_lossy(&masked).into_owned()
}

/// Blank the bodies of `CREATE FUNCTION/PROCEDURE/TRIGGER` statements
///
/// Expects text that already went through [`mask_comments`]. PostgreSQL
/// bodies are dollar-quoted, so the statement is blanked up to its `;`. For
/// the SQL Server family a body opening with `BEGIN` is blanked through the
/// matching `END`; any other body runs to the next `GO` line or the end of
/// the script.
pub fn mask_routine_bodies(masked: &str, dialect: Dialect) -> String {
    blank_spans(masked, &routine_body_spans(masked, dialect))
}

/// Byte ranges of routine statements in comment-masked text
pub fn routine_body_spans(masked: &str, dialect: Dialect) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut search_from = 0usize;

    while let Some(header) = ROUTINE_HEADER_RE.find_at(masked, search_from) {
        let end = if dialect.is_ms_family() {
            ms_routine_end(masked, header.end(), dialect)
        } else {
            masked[header.end()..]
                .find(';')
                .map(|p| header.end() + p + 1)
                .unwrap_or(masked.len())
        };
        spans.push((header.start(), end));
        search_from = end.max(header.end());
        if search_from >= masked.len() {
            break;
        }
    }

    spans
}

/// Blank `spans` of `text`; spans must start and end on ASCII boundaries
pub fn blank_spans(text: &str, spans: &[(usize, usize)]) -> String {
    if spans.is_empty() {
        return text.to_string();
    }

    let mut bytes = text.as_bytes().to_vec();
    let len = bytes.len();
    for &(start, end) in spans {
        blank(&mut bytes, start.min(len), end.min(len));
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

fn ms_routine_end(masked: &str, header_end: usize, dialect: Dialect) -> usize {
    let batch_end = BATCH_SEPARATOR_RE
        .find_at(masked, header_end)
        .map(|m| m.start())
        .unwrap_or(masked.len());

    let Some(body_as) = BODY_AS_RE.find(&masked[header_end..batch_end]) else {
        return batch_end;
    };
    let body_start = header_end + body_as.end();

    let opens_with_begin = LEADING_WORD_RE
        .captures(&masked[body_start..batch_end])
        .and_then(|caps| caps.get(1))
        .is_some_and(|word| word.as_str().eq_ignore_ascii_case("begin"));
    if !opens_with_begin {
        return batch_end;
    }

    // `[end]` or "case" as an identifier must not move the depth
    let body = mask_spans(&masked[body_start..batch_end], dialect, true, true);
    let mut depth = 0usize;
    for word in BLOCK_WORD_RE.find_iter(&body) {
        let text = word.as_str().to_ascii_lowercase();
        if text == "end" {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return body_start + word.end();
            }
        } else if text == "case" || text == "begin" {
            depth += 1;
        }
        // BEGIN TRAN has no matching END
    }
    batch_end
}

fn blank(bytes: &mut [u8], start: usize, end: usize) {
    for b in &mut bytes[start..end] {
        if *b != b'\n' {
            *b = b' ';
        }
    }
}

fn find_byte(bytes: &[u8], from: usize, needle: u8) -> Option<usize> {
    bytes[from..].iter().position(|&b| b == needle).map(|p| from + p)
}

fn find_seq(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from > bytes.len() {
        return None;
    }
    bytes[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| from + p)
}

/// Index just past the literal opened at `start`; doubled closers are escapes
fn skip_quoted(bytes: &[u8], start: usize, close: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == close {
            if bytes.get(i + 1) == Some(&close) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

fn skip_identifier(bytes: &[u8], masked: &mut [u8], start: usize, close: u8, mask: bool) -> usize {
    let end = skip_quoted(bytes, start, close);
    if mask {
        blank(masked, start, end);
    }
    end
}

/// `E'...'` or `e'...'` opening at `start`, not the tail of an identifier
fn is_escape_string(bytes: &[u8], start: usize) -> bool {
    start > 0
        && matches!(bytes[start - 1], b'E' | b'e')
        && (start < 2 || !is_ident_byte(bytes[start - 2]))
}

/// Like [`skip_quoted`], but a backslash also escapes the next byte
fn skip_escape_string(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\'' if bytes.get(i + 1) == Some(&b'\'') => i += 2,
            b'\'' => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// The `$tag$` opening at `start`, if any
fn dollar_tag(bytes: &[u8], start: usize) -> Option<&[u8]> {
    // `a$b$` is an identifier, `$1` a parameter
    if start > 0 && is_ident_byte(bytes[start - 1]) {
        return None;
    }
    let mut i = start + 1;
    if let Some(&first) = bytes.get(i) {
        if first.is_ascii_digit() {
            return None;
        }
    }
    while i < bytes.len() && is_ident_byte(bytes[i]) {
        i += 1;
    }
    if bytes.get(i) == Some(&b'$') {
        Some(&bytes[start..=i])
    } else {
        None
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}
