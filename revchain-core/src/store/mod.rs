//! Schema stores.
//!
//! A store exposes the four primitive operations plus the applied-state
//! marker and the run history. All writes happen inside a
//! [`StoreTransaction`]; dropping one without calling `commit` rolls it back.

mod memory;
pub mod schema;
pub mod sql;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use crate::models::{CreateHistoryInput, HistoryEntry, Operation, RevisionId};

pub trait SchemaStore {
    /// Persisted marker, outside of any transaction.
    fn marker(&mut self) -> Result<Option<RevisionId>, StoreError>;

    fn begin(&mut self) -> Result<Box<dyn StoreTransaction + '_>, StoreError>;

    /// Committed history, oldest first.
    fn history(&mut self) -> Result<Vec<HistoryEntry>, StoreError>;
}

pub trait StoreTransaction {
    fn marker(&self) -> Result<Option<RevisionId>, StoreError>;

    fn execute(&mut self, op: &Operation) -> Result<(), StoreError>;

    fn set_marker(&mut self, marker: Option<&RevisionId>) -> Result<(), StoreError>;

    fn record(&mut self, entry: CreateHistoryInput) -> Result<(), StoreError>;

    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Validate `op` against the current schema before running it.
///
/// `columns_of` returns the column names of a table, or `None` if the table
/// does not exist. Both stores share this so they fail the same way.
/// Names compare ASCII case-insensitively, as SQLite does.
pub(crate) fn precheck<F>(op: &Operation, columns_of: F) -> Result<(), StoreError>
where
    F: Fn(&str) -> Result<Option<Vec<String>>, StoreError>,
{
    if let Operation::CreateTable { table, columns, .. } = op {
        if columns.is_empty() {
            return Err(StoreError::NoColumns {
                table: table.clone(),
            });
        }
    }
    sql::render(op)?;

    let table = op.table();
    let existing = columns_of(table)?;
    let missing_table = || StoreError::NoSuchTable {
        table: table.to_string(),
    };

    match op {
        Operation::AddColumn { column, .. } => {
            let columns = existing.ok_or_else(missing_table)?;
            if columns.iter().any(|c| same_name(c, &column.name)) {
                return Err(StoreError::ColumnExists {
                    table: table.to_string(),
                    column: column.name.clone(),
                });
            }
            if !column.nullable && column.default.is_none() {
                return Err(StoreError::NotNullWithoutDefault {
                    table: table.to_string(),
                    column: column.name.clone(),
                });
            }
        }
        Operation::DropColumn { column, .. } => {
            let columns = existing.ok_or_else(missing_table)?;
            if !columns.iter().any(|c| same_name(c, column)) {
                return Err(StoreError::NoSuchColumn {
                    table: table.to_string(),
                    column: column.clone(),
                });
            }
        }
        Operation::CreateTable {
            columns,
            primary_key,
            ..
        } => {
            if existing.is_some() {
                return Err(StoreError::TableExists {
                    table: table.to_string(),
                });
            }
            if let Some(key) = primary_key
                .iter()
                .find(|k| !columns.iter().any(|c| same_name(&c.name, k)))
            {
                return Err(StoreError::NoSuchColumn {
                    table: table.to_string(),
                    column: key.clone(),
                });
            }
        }
        Operation::DropTable { .. } => {
            existing.ok_or_else(missing_table)?;
        }
    }

    Ok(())
}

pub(crate) fn same_name(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}
