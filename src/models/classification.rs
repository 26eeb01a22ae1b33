// Classification result
//
// What a script does to tables: the three category views plus the ordered
// event stream they are derived from.

use indexmap::IndexMap;
use serde::Serialize;

use super::TableRef;

/// One table-affecting statement found in a script
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TableEvent {
    Created { table: TableRef },
    Dropped { table: TableRef },
    Renamed { from: TableRef, to: TableRef },
}

/// Per-script classification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Events in the order they appear in the script
    events: Vec<(usize, TableEvent)>,
}

impl Classification {
    /// Build from `(offset, event)` pairs, ordering by offset
    pub(crate) fn from_events(mut events: Vec<(usize, TableEvent)>) -> Self {
        // stable: events at the same offset keep detector order
        events.sort_by_key(|(offset, _)| *offset);
        Self { events }
    }

    pub fn events(&self) -> impl Iterator<Item = &TableEvent> {
        self.events.iter().map(|(_, event)| event)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Tables created, in order, duplicates kept
    pub fn created(&self) -> Vec<TableRef> {
        self.events()
            .filter_map(|event| match event {
                TableEvent::Created { table } => Some(table.clone()),
                _ => None,
            })
            .collect()
    }

    /// Tables dropped, in order, duplicates kept
    pub fn dropped(&self) -> Vec<TableRef> {
        self.events()
            .filter_map(|event| match event {
                TableEvent::Dropped { table } => Some(table.clone()),
                _ => None,
            })
            .collect()
    }

    /// New name -> old name; a later rename to the same name wins
    pub fn renamed(&self) -> IndexMap<TableRef, TableRef> {
        let mut renames = IndexMap::new();
        for event in self.events() {
            if let TableEvent::Renamed { from, to } = event {
                renames.insert(to.clone(), from.clone());
            }
        }
        renames
    }
}

/// Serializable summary of a classification
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationReport {
    pub created: Vec<TableRef>,
    pub dropped: Vec<TableRef>,
    pub renamed: Vec<RenamePair>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenamePair {
    pub from: TableRef,
    pub to: TableRef,
}

impl From<&Classification> for ClassificationReport {
    fn from(classification: &Classification) -> Self {
        Self {
            created: classification.created(),
            dropped: classification.dropped(),
            renamed: classification
                .renamed()
                .into_iter()
                .map(|(to, from)| RenamePair { from, to })
                .collect(),
        }
    }
}
