/// Bookkeeping tables owned by revchain inside the managed database.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS revchain_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    revision TEXT
);

CREATE TABLE IF NOT EXISTS revchain_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    revision_id TEXT NOT NULL,
    direction TEXT NOT NULL CHECK (direction IN ('upgrade', 'downgrade')),
    marker_before TEXT,
    marker_after TEXT,
    applied_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_history_run ON revchain_history(run_id);
"#;

/// Prefix reserved for bookkeeping tables; revisions may not touch them.
pub const RESERVED_PREFIX: &str = "revchain_";
