//! Error taxonomy.
//!
//! `ChainError` covers structural problems in the revision graph and is always
//! raised before the schema store is touched. `OperationError` covers a
//! revision that failed against the store; its partial changes are rolled back.

use std::path::PathBuf;

use crate::models::{Direction, RevisionId};

fn join(ids: &[RevisionId]) -> String {
    ids.iter()
        .map(RevisionId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn marker(id: &Option<RevisionId>) -> String {
    id.as_ref()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "base".to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("revision id {id} is declared more than once")]
    DuplicateId { id: RevisionId },

    #[error("multiple root revisions: {}", join(.roots))]
    MultipleRoots { roots: Vec<RevisionId> },

    #[error("revision {parent} is the parent of multiple revisions: {}", join(.children))]
    MultipleChildren {
        parent: RevisionId,
        children: Vec<RevisionId>,
    },

    #[error("revision {revision} names unknown parent {parent}")]
    DanglingParent {
        revision: RevisionId,
        parent: RevisionId,
    },

    #[error("parent links from revision {revision} never reach the root")]
    Cycle { revision: RevisionId },

    #[error("unknown target revision: {target}")]
    UnknownTarget { target: String },

    #[error("target {target} matches multiple revisions: {}", join(.candidates))]
    AmbiguousTarget {
        target: String,
        candidates: Vec<RevisionId>,
    },

    #[error("applied marker {marker} is not part of the revision chain")]
    UnknownMarker { marker: RevisionId },

    #[error("target {target} is not a valid {requested} destination")]
    WrongDirection {
        requested: Direction,
        target: String,
    },
}

/// Failure of a single primitive operation against a schema store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("table {table} does not exist")]
    NoSuchTable { table: String },

    #[error("table {table} already exists")]
    TableExists { table: String },

    #[error("table {table} must declare at least one column")]
    NoColumns { table: String },

    #[error("column {table}.{column} does not exist")]
    NoSuchColumn { table: String, column: String },

    #[error("column {table}.{column} already exists")]
    ColumnExists { table: String, column: String },

    #[error("column {table}.{column} is NOT NULL without a default")]
    NotNullWithoutDefault { table: String, column: String },

    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("corrupt bookkeeping state: {0}")]
    Corrupt(String),
}

#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("revision {revision}: operation #{index} ({operation}) failed: {source}")]
    Operation {
        revision: RevisionId,
        index: usize,
        operation: String,
        #[source]
        source: StoreError,
    },

    #[error(
        "revision {revision}: store marker is {}, expected {}",
        marker(.found),
        marker(.expected)
    )]
    MarkerMismatch {
        revision: RevisionId,
        expected: Option<RevisionId>,
        found: Option<RevisionId>,
    },

    #[error("revision {revision}: {source}")]
    Store {
        revision: RevisionId,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("cannot read revisions from {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid revision file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("revision file {} already exists", .path.display())]
    Exists { path: PathBuf },
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("another run holds {}{}", .path.display(), holder_suffix(.holder))]
    Held {
        path: PathBuf,
        holder: Option<String>,
    },

    #[error("lock file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn holder_suffix(holder: &Option<String>) -> String {
    holder
        .as_ref()
        .map(|h| format!(" ({})", h))
        .unwrap_or_default()
}

impl OperationError {
    pub fn revision(&self) -> &RevisionId {
        match self {
            Self::Operation { revision, .. }
            | Self::MarkerMismatch { revision, .. }
            | Self::Store { revision, .. } => revision,
        }
    }
}
