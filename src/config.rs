//! Runtime configuration.
//!
//! Paths come from CLI flags, then `REVCHAIN_*` environment variables, then
//! per-user defaults.

use std::path::PathBuf;

use anyhow::Context;
use directories::ProjectDirs;
use revchain_core::{resolve_chain, source, Chain, RevisionId, RunLock, SqliteStore};

pub const DEFAULT_REVISIONS_DIR: &str = "revisions";

#[derive(Debug, Clone)]
pub struct Config {
    pub database: PathBuf,
    pub revisions: PathBuf,
}

impl Config {
    pub fn new(database: impl Into<PathBuf>, revisions: impl Into<PathBuf>) -> Self {
        Self {
            database: database.into(),
            revisions: revisions.into(),
        }
    }

    /// Fill in the per-user database location when none was given.
    pub fn resolve(database: Option<PathBuf>, revisions: PathBuf) -> anyhow::Result<Self> {
        let database = match database {
            Some(path) => path,
            None => Self::default_database()?,
        };
        Ok(Self::new(database, revisions))
    }

    /// `<data dir>/revchain.db`, e.g. `~/.local/share/revchain/revchain.db`.
    pub fn default_database() -> anyhow::Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "revchain")
            .context("could not determine a data directory for the default database")?;
        Ok(dirs.data_dir().join("revchain.db"))
    }

    pub fn lock_path(&self) -> PathBuf {
        RunLock::path_for(&self.database)
    }

    /// Load and resolve the revision files.
    pub fn load_chain(&self) -> anyhow::Result<Chain> {
        let revisions = source::load_dir(&self.revisions)?;
        let chain = resolve_chain(revisions)
            .with_context(|| format!("invalid revision chain in {}", self.revisions.display()))?;
        Ok(chain)
    }

    pub fn open_store(&self) -> anyhow::Result<SqliteStore> {
        SqliteStore::open(&self.database)
            .with_context(|| format!("failed to open database {}", self.database.display()))
    }

    /// Marker read without creating or initializing the database.
    pub fn peek_marker(&self) -> anyhow::Result<Option<RevisionId>> {
        SqliteStore::peek_marker(&self.database)
            .with_context(|| format!("failed to read database {}", self.database.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_database_wins() {
        let config = Config::resolve(Some("/tmp/x.db".into()), "revs".into()).unwrap();
        assert_eq!(config.database, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.lock_path(), PathBuf::from("/tmp/x.db.lock"));
    }

    #[test]
    fn peek_does_not_create_the_database() {
        let dir = TempDir::new().unwrap();
        let config = Config::new(dir.path().join("app.db"), dir.path().join("revisions"));

        assert_eq!(config.peek_marker().unwrap(), None);
        assert!(!config.database.exists());
    }

    #[test]
    fn missing_revisions_directory_is_an_empty_chain() {
        let dir = TempDir::new().unwrap();
        let config = Config::new(dir.path().join("app.db"), dir.path().join("revisions"));
        assert!(config.load_chain().unwrap().is_empty());
    }
}
