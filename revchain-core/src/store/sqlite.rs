use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{
    params, Connection, OpenFlags, OptionalExtension, Transaction, TransactionBehavior,
};
use uuid::Uuid;

use super::schema::{RESERVED_PREFIX, SCHEMA};
use super::{precheck, sql, SchemaStore, StoreTransaction};
use crate::error::StoreError;
use crate::models::{CreateHistoryInput, Direction, HistoryEntry, Operation, RevisionId};

/// Schema store backed by a SQLite database.
pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and ensure bookkeeping tables.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::initialize(conn, Some(path.to_path_buf()))
    }

    /// Read the marker at `path` without creating the file or the
    /// bookkeeping tables.
    pub fn peek_marker(path: impl AsRef<Path>) -> Result<Option<RevisionId>, StoreError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        if table_columns(&conn, "revchain_version")?.is_none() {
            return Ok(None);
        }
        read_marker(&conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn, None)
    }

    fn initialize(conn: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        tracing::debug!(path = ?path, "opened sqlite schema store");
        Ok(Self { conn, path })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Application tables, excluding SQLite internals and bookkeeping.
    pub fn tables(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names
            .into_iter()
            .filter(|n| !n.starts_with(RESERVED_PREFIX))
            .collect())
    }

    /// Column names of `table`, or `None` if it does not exist.
    pub fn columns(&self, table: &str) -> Result<Option<Vec<String>>, StoreError> {
        table_columns(&self.conn, table)
    }

    /// Direct access for seeding or inspecting application tables.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl SchemaStore for SqliteStore {
    fn marker(&mut self) -> Result<Option<RevisionId>, StoreError> {
        read_marker(&self.conn)
    }

    fn begin(&mut self) -> Result<Box<dyn StoreTransaction + '_>, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(Box::new(SqliteTransaction { tx }))
    }

    fn history(&mut self) -> Result<Vec<HistoryEntry>, StoreError> {
        read_history(&self.conn)
    }
}

struct SqliteTransaction<'a> {
    tx: Transaction<'a>,
}

impl StoreTransaction for SqliteTransaction<'_> {
    fn marker(&self) -> Result<Option<RevisionId>, StoreError> {
        read_marker(&self.tx)
    }

    fn execute(&mut self, op: &Operation) -> Result<(), StoreError> {
        precheck(op, |table| table_columns(&self.tx, table))?;
        let statement = sql::render(op)?;
        tracing::debug!(sql = %statement, "executing");
        self.tx.execute_batch(&statement)?;
        Ok(())
    }

    fn set_marker(&mut self, marker: Option<&RevisionId>) -> Result<(), StoreError> {
        self.tx.execute(
            "INSERT INTO revchain_version (id, revision) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET revision = excluded.revision",
            params![marker.map(RevisionId::as_str)],
        )?;
        Ok(())
    }

    fn record(&mut self, entry: CreateHistoryInput) -> Result<(), StoreError> {
        self.tx.execute(
            "INSERT INTO revchain_history
                (run_id, revision_id, direction, marker_before, marker_after, applied_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.run_id.to_string(),
                entry.revision_id.as_str(),
                entry.direction.as_str(),
                entry.marker_before.as_ref().map(RevisionId::as_str),
                entry.marker_after.as_ref().map(RevisionId::as_str),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let SqliteTransaction { tx } = *self;
        tx.commit()?;
        Ok(())
    }
}

fn table_columns(conn: &Connection, table: &str) -> Result<Option<Vec<String>>, StoreError> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
            params![table],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if !exists {
        return Ok(None);
    }

    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
    let columns = stmt
        .query_map(params![table], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(columns))
}

fn read_marker(conn: &Connection) -> Result<Option<RevisionId>, StoreError> {
    let marker = conn
        .query_row(
            "SELECT revision FROM revchain_version WHERE id = 1",
            [],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?
        .flatten();
    Ok(marker.map(RevisionId::from))
}

type HistoryRow = (
    i64,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
);

fn read_history(conn: &Connection) -> Result<Vec<HistoryEntry>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, run_id, revision_id, direction, marker_before, marker_after, applied_at
         FROM revchain_history ORDER BY id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
            ))
        })?
        .collect::<Result<Vec<HistoryRow>, _>>()?;

    rows.into_iter().map(history_from_row).collect()
}

fn history_from_row(row: HistoryRow) -> Result<HistoryEntry, StoreError> {
    let (id, run_id, revision_id, direction, before, after, applied_at) = row;
    Ok(HistoryEntry {
        id,
        run_id: Uuid::parse_str(&run_id)
            .map_err(|e| StoreError::Corrupt(format!("history row {}: run id: {}", id, e)))?,
        revision_id: revision_id.into(),
        direction: Direction::from_str(&direction).ok_or_else(|| {
            StoreError::Corrupt(format!("history row {}: direction {:?}", id, direction))
        })?,
        marker_before: before.map(RevisionId::from),
        marker_after: after.map(RevisionId::from),
        applied_at: DateTime::parse_from_rfc3339(&applied_at)
            .map_err(|e| StoreError::Corrupt(format!("history row {}: applied_at: {}", id, e)))?
            .with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnSpec, ColumnType};
    use tempfile::TempDir;

    fn users_table(store: &SqliteStore) {
        store
            .connection()
            .execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT)")
            .unwrap();
    }

    #[test]
    fn fresh_store_has_no_marker() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.marker().unwrap(), None);
        assert!(store.history().unwrap().is_empty());
        assert!(store.tables().unwrap().is_empty());
    }

    #[test]
    fn peek_leaves_foreign_database_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.db");
        assert_eq!(SqliteStore::peek_marker(&path).unwrap(), None);
        assert!(!path.exists());

        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY)")
            .unwrap();
        assert_eq!(SqliteStore::peek_marker(&path).unwrap(), None);

        let conn = Connection::open(&path).unwrap();
        assert!(table_columns(&conn, "revchain_version").unwrap().is_none());
    }

    #[test]
    fn peek_reads_committed_marker() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.db");
        {
            let mut store = SqliteStore::open(&path).unwrap();
            let mut tx = store.begin().unwrap();
            tx.set_marker(Some(&"r1".into())).unwrap();
            tx.commit().unwrap();
        }
        assert_eq!(SqliteStore::peek_marker(&path).unwrap(), Some("r1".into()));
    }

    #[test]
    fn refuses_the_same_bad_operations_as_memory_store() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        users_table(&store);
        let mut tx = store.begin().unwrap();

        let empty = tx
            .execute(&Operation::CreateTable {
                table: "sectors".into(),
                columns: Vec::new(),
                primary_key: Vec::new(),
            })
            .unwrap_err();
        assert!(matches!(empty, StoreError::NoColumns { .. }));

        let dup = tx
            .execute(&Operation::AddColumn {
                table: "USERS".into(),
                column: ColumnSpec::new("Email", ColumnType::Text),
            })
            .unwrap_err();
        assert!(matches!(dup, StoreError::ColumnExists { .. }));

        tx.execute(&Operation::DropColumn {
            table: "Users".into(),
            column: "EMAIL".into(),
        })
        .unwrap();
    }

    #[test]
    fn uncommitted_transaction_rolls_back() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        users_table(&store);

        {
            let mut tx = store.begin().unwrap();
            tx.execute(&Operation::AddColumn {
                table: "users".into(),
                column: ColumnSpec::new("last_seen", ColumnType::DateTime),
            })
            .unwrap();
            tx.set_marker(Some(&"r1".into())).unwrap();
            assert_eq!(tx.marker().unwrap(), Some("r1".into()));
        }

        assert_eq!(store.marker().unwrap(), None);
        assert_eq!(
            store.columns("users").unwrap().unwrap(),
            vec!["id".to_string(), "email".to_string()]
        );
    }

    #[test]
    fn marker_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("app.db");

        {
            let mut store = SqliteStore::open(&path).unwrap();
            let mut tx = store.begin().unwrap();
            tx.set_marker(Some(&"r2".into())).unwrap();
            tx.commit().unwrap();
        }

        let mut store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.marker().unwrap(), Some("r2".into()));
        assert_eq!(store.path(), Some(path.as_path()));
    }

    #[test]
    fn marker_can_return_to_base() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut tx = store.begin().unwrap();
        tx.set_marker(Some(&"r1".into())).unwrap();
        tx.set_marker(None).unwrap();
        tx.commit().unwrap();
        assert_eq!(store.marker().unwrap(), None);
    }

    #[test]
    fn history_rows_round_trip() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let run_id = Uuid::new_v4();
        let mut tx = store.begin().unwrap();
        tx.record(CreateHistoryInput {
            run_id,
            revision_id: "r1".into(),
            direction: Direction::Upgrade,
            marker_before: None,
            marker_after: Some("r1".into()),
        })
        .unwrap();
        tx.commit().unwrap();

        let history = store.history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].run_id, run_id);
        assert_eq!(history[0].direction, Direction::Upgrade);
        assert_eq!(history[0].marker_before, None);
        assert_eq!(history[0].marker_after, Some("r1".into()));
    }

    #[test]
    fn rejects_duplicate_column_before_touching_sqlite() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        users_table(&store);
        let mut tx = store.begin().unwrap();
        let err = tx
            .execute(&Operation::AddColumn {
                table: "users".into(),
                column: ColumnSpec::new("email", ColumnType::Text),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::ColumnExists { .. }));
    }

    #[test]
    fn drops_columns_and_tables() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        users_table(&store);
        let mut tx = store.begin().unwrap();
        tx.execute(&Operation::DropColumn {
            table: "users".into(),
            column: "email".into(),
        })
        .unwrap();
        tx.execute(&Operation::CreateTable {
            table: "sectors".into(),
            columns: vec![ColumnSpec::new("id", ColumnType::Integer).not_null()],
            primary_key: vec!["id".into()],
        })
        .unwrap();
        tx.execute(&Operation::DropTable {
            table: "users".into(),
        })
        .unwrap();
        tx.commit().unwrap();

        assert_eq!(store.tables().unwrap(), vec!["sectors".to_string()]);
    }
}
