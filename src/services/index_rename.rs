// Rename indexes that embed a renamed table's old name
use crate::error::StatementError;
use crate::models::TableRef;
use crate::services::executor::Executor;
use crate::services::profile::{DialectProfile, INDEX_NAME_COLUMN};

/// Rename every index on `table` whose name contains `old_table`
///
/// `roads_old_geom_idx` on a table renamed from `roads_old` to `roads` becomes
/// `roads_geom_idx`. Returns how many indexes were renamed; a failing rename
/// is logged and skipped.
pub async fn rename_indexes<E: Executor + ?Sized>(
    exec: &E,
    table: &TableRef,
    old_table: &str,
) -> Result<usize, StatementError> {
    if old_table.is_empty() || old_table == table.table {
        return Ok(0);
    }

    let profile = DialectProfile::new(exec.dialect());
    let indexes = exec
        .execute(&profile.list_indexes(table))
        .await?
        .column_strings(INDEX_NAME_COLUMN);

    let mut renamed = 0;
    for index in indexes {
        let Some(new_index) = replace_ignore_case(&index, old_table, &table.table) else {
            continue;
        };
        match exec.execute(&profile.rename_index(table, &index, &new_index)).await {
            Ok(_) => {
                tracing::debug!("Renamed index {} to {} on {}", index, new_index, table);
                renamed += 1;
            }
            Err(e) => tracing::warn!("Failed to rename index {} on {}: {}", index, table, e),
        }
    }

    Ok(renamed)
}

/// `haystack` with every case-insensitive `needle` replaced; None when absent
fn replace_ignore_case(haystack: &str, needle: &str, replacement: &str) -> Option<String> {
    let lower_haystack = haystack.to_lowercase();
    let lower_needle = needle.to_lowercase();
    // folding changed byte lengths, offsets would not line up
    if lower_haystack.len() != haystack.len() || lower_needle.len() != needle.len() {
        return None;
    }

    let mut result = String::with_capacity(haystack.len());
    let mut last = 0;
    for (start, _) in lower_haystack.match_indices(&lower_needle) {
        result.push_str(&haystack[last..start]);
        result.push_str(replacement);
        last = start + needle.len();
    }
    if last == 0 {
        return None;
    }
    result.push_str(&haystack[last..]);
    Some(result)
}
