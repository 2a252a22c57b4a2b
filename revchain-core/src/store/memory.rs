use std::collections::BTreeMap;

use chrono::Utc;

use super::{precheck, same_name, SchemaStore, StoreTransaction};
use crate::error::StoreError;
use crate::models::{ColumnSpec, CreateHistoryInput, HistoryEntry, Operation, RevisionId};

#[derive(Debug, Clone, Default)]
struct State {
    tables: BTreeMap<String, Vec<ColumnSpec>>,
    marker: Option<RevisionId>,
    history: Vec<HistoryEntry>,
}

impl State {
    /// Stored spelling of `table`, matched case-insensitively.
    fn table_key(&self, table: &str) -> Option<&str> {
        self.tables
            .keys()
            .find(|k| same_name(k, table))
            .map(String::as_str)
    }
}

/// In-memory schema model. Transactions work on a copy of the state and
/// swap it in on commit.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: State,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a pre-existing application table.
    pub fn with_table(mut self, name: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        self.state.tables.insert(name.into(), columns);
        self
    }

    pub fn tables(&self) -> Vec<&str> {
        self.state.tables.keys().map(String::as_str).collect()
    }

    pub fn columns(&self, table: &str) -> Option<Vec<&str>> {
        self.state
            .table_key(table)
            .and_then(|key| self.state.tables.get(key))
            .map(|cols| cols.iter().map(|c| c.name.as_str()).collect())
    }
}

impl SchemaStore for MemoryStore {
    fn marker(&mut self) -> Result<Option<RevisionId>, StoreError> {
        Ok(self.state.marker.clone())
    }

    fn begin(&mut self) -> Result<Box<dyn StoreTransaction + '_>, StoreError> {
        let working = self.state.clone();
        Ok(Box::new(MemoryTransaction {
            store: self,
            working,
        }))
    }

    fn history(&mut self) -> Result<Vec<HistoryEntry>, StoreError> {
        Ok(self.state.history.clone())
    }
}

struct MemoryTransaction<'a> {
    store: &'a mut MemoryStore,
    working: State,
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn marker(&self) -> Result<Option<RevisionId>, StoreError> {
        Ok(self.working.marker.clone())
    }

    fn execute(&mut self, op: &Operation) -> Result<(), StoreError> {
        let working = &self.working;
        precheck(op, |table| {
            Ok(working
                .table_key(table)
                .and_then(|key| working.tables.get(key))
                .map(|cols| cols.iter().map(|c| c.name.clone()).collect()))
        })?;

        let key = self.working.table_key(op.table()).map(str::to_string);
        match (op, key) {
            (Operation::AddColumn { column, .. }, Some(key)) => {
                if let Some(cols) = self.working.tables.get_mut(&key) {
                    cols.push(column.clone());
                }
            }
            (Operation::DropColumn { column, .. }, Some(key)) => {
                if let Some(cols) = self.working.tables.get_mut(&key) {
                    cols.retain(|c| !same_name(&c.name, column));
                }
            }
            (Operation::CreateTable { table, columns, .. }, None) => {
                self.working.tables.insert(table.clone(), columns.clone());
            }
            (Operation::DropTable { .. }, Some(key)) => {
                self.working.tables.remove(&key);
            }
            _ => {}
        }
        Ok(())
    }

    fn set_marker(&mut self, marker: Option<&RevisionId>) -> Result<(), StoreError> {
        self.working.marker = marker.cloned();
        Ok(())
    }

    fn record(&mut self, entry: CreateHistoryInput) -> Result<(), StoreError> {
        let id = self.working.history.len() as i64 + 1;
        self.working.history.push(HistoryEntry {
            id,
            run_id: entry.run_id,
            revision_id: entry.revision_id,
            direction: entry.direction,
            marker_before: entry.marker_before,
            marker_after: entry.marker_after,
            applied_at: Utc::now(),
        });
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction { store, working } = *self;
        store.state = working;
        Ok(())
    }
}
