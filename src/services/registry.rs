// In-memory record of the tables one session created and dropped
use indexmap::IndexMap;

use crate::models::TableRef;

/// Tables created and dropped by a session
///
/// `created` only ever holds tables the session believes exist: a drop or a
/// rename away removes the entry. `dropped` only grows until [`reset`].
///
/// [`reset`]: TableRegistry::reset
#[derive(Debug, Clone, Default)]
pub struct TableRegistry {
    created: Vec<TableRef>,
    dropped: Vec<TableRef>,
    last_statement_renames: IndexMap<TableRef, TableRef>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tables_created(&self) -> &[TableRef] {
        &self.created
    }

    pub fn tables_dropped(&self) -> &[TableRef] {
        &self.dropped
    }

    /// Renames seen in the most recent statement, new name -> old name
    pub fn last_statement_renames(&self) -> &IndexMap<TableRef, TableRef> {
        &self.last_statement_renames
    }

    pub fn is_tracked(&self, table: &TableRef) -> bool {
        self.created.contains(table)
    }

    /// Start bookkeeping for a new statement
    pub fn begin_statement(&mut self) {
        self.last_statement_renames.clear();
    }

    /// Returns false when the table was already tracked
    pub fn record_created(&mut self, table: TableRef) -> bool {
        if self.created.contains(&table) {
            return false;
        }
        self.created.push(table);
        true
    }

    /// Returns true when the table had been created by this session
    pub fn record_dropped(&mut self, table: TableRef) -> bool {
        let was_tracked = self.remove_created(&table);
        self.dropped.push(table);
        was_tracked
    }

    /// Track `from` under its new name; returns true when `from` was tracked
    ///
    /// A tracked entry keeps its own database qualifier and only takes the
    /// new table name.
    pub fn record_renamed(&mut self, from: TableRef, to: TableRef) -> bool {
        let was_tracked = match self.find_created(&from) {
            Some(index) => {
                let renamed = self.created[index].renamed(to.table.clone());
                self.created[index] = renamed.clone();
                // `to` may also have been tracked already
                let mut seen = false;
                self.created.retain(|t| {
                    if *t != renamed {
                        return true;
                    }
                    let keep = !seen;
                    seen = true;
                    keep
                });
                true
            }
            None => false,
        };
        self.dropped.push(from.clone());
        self.last_statement_renames.insert(to, from);
        was_tracked
    }

    /// Hand over the created list, leaving it empty
    pub fn take_created(&mut self) -> Vec<TableRef> {
        std::mem::take(&mut self.created)
    }

    /// Forget everything
    pub fn reset(&mut self) {
        self.created.clear();
        self.dropped.clear();
        self.last_statement_renames.clear();
    }

    /// Exact match first, then one that differs only in unset qualifiers
    fn find_created(&self, table: &TableRef) -> Option<usize> {
        self.created
            .iter()
            .position(|t| t == table)
            .or_else(|| self.created.iter().position(|t| t.same_table(table)))
    }

    fn remove_created(&mut self, table: &TableRef) -> bool {
        match self.find_created(table) {
            Some(index) => {
                self.created.remove(index);
                true
            }
            None => false,
        }
    }
}
