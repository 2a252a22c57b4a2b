//! Advisory run lock.
//!
//! Only one migration run may touch a database at a time. The lock is a
//! sidecar file created with `create_new`; it is removed when the guard drops.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::LockError;

/// Contents of the lock file, for diagnosing a stale lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub holder: String,
    pub acquired_at: String,
}

#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Lock file that guards the database at `database`.
    pub fn path_for(database: &Path) -> PathBuf {
        let mut name = database.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    pub fn acquire(path: impl Into<PathBuf>, holder: &str) -> Result<Self, LockError> {
        Self::acquire_with(path.into(), holder, |file, info| {
            let json = serde_json::to_string_pretty(info)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()
        })
    }

    /// Create the lock file, then fill it with `write`. The guard exists
    /// before anything is written, so a failed write removes the file.
    fn acquire_with<F>(path: PathBuf, holder: &str, write: F) -> Result<Self, LockError>
    where
        F: FnOnce(&mut File, &LockInfo) -> std::io::Result<()>,
    {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| LockError::Io {
                    path: path.clone(),
                    source,
                })?;
            }
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = Self::read_info(&path)
                    .ok()
                    .flatten()
                    .map(|info| format!("pid {} {} since {}", info.pid, info.holder, info.acquired_at));
                return Err(LockError::Held { path, holder });
            }
            Err(source) => return Err(LockError::Io { path, source }),
        };
        let lock = Self { path };

        let info = LockInfo {
            pid: std::process::id(),
            holder: holder.to_string(),
            acquired_at: chrono::Utc::now().to_rfc3339(),
        };
        if let Err(source) = write(&mut file, &info) {
            return Err(LockError::Io {
                path: lock.path.clone(),
                source,
            });
        }

        tracing::debug!(path = %lock.path.display(), "acquired run lock");
        Ok(lock)
    }

    pub fn read_info(path: &Path) -> std::io::Result<Option<LockInfo>> {
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(path)?;
        let info: LockInfo = serde_json::from_str(&json)?;
        Ok(Some(info))
    }

    /// Remove a lock left behind by a crashed run.
    pub fn force_release(path: &Path) -> std::io::Result<bool> {
        if path.exists() {
            fs::remove_file(path)?;
            tracing::warn!(path = %path.display(), "removed run lock");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), "failed to release run lock: {}", e);
        }
    }
}
