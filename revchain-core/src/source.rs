//! Revision files on disk.
//!
//! Each `*.json` file in the revisions directory holds one [`Revision`].
//! Loading only produces the list; ordering and validation belong to
//! [`crate::chain::resolve_chain`].

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use uuid::Uuid;

use crate::error::SourceError;
use crate::models::{Revision, RevisionId};

/// Load every revision file in `dir`, in file name order.
///
/// A missing directory yields an empty list.
pub fn load_dir(dir: &Path) -> Result<Vec<Revision>, SourceError> {
    if !dir.exists() {
        tracing::debug!(dir = %dir.display(), "revisions directory does not exist");
        return Ok(Vec::new());
    }

    let io_err = |source| SourceError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if path.is_file() && !hidden && path.extension().is_some_and(|e| e == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let revisions = paths
        .iter()
        .map(|path| read_revision(path))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(dir = %dir.display(), count = revisions.len(), "loaded revision files");
    Ok(revisions)
}

pub fn read_revision(path: &Path) -> Result<Revision, SourceError> {
    let json = fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&json).map_err(|source| SourceError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Fresh 12-hex-digit revision id.
pub fn new_revision_id() -> RevisionId {
    let hex = Uuid::new_v4().simple().to_string();
    RevisionId::new(&hex[..12])
}

/// File-name friendly form of a revision message.
pub fn slug(message: &str) -> String {
    let mut slug = String::with_capacity(message.len());
    for c in message.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_matches('_');
    slug.chars().take(40).collect::<String>().trim_end_matches('_').to_string()
}

/// Build an empty revision on top of `head` and write it into `dir`.
pub fn scaffold(
    dir: &Path,
    message: &str,
    head: Option<&RevisionId>,
) -> Result<(Revision, PathBuf), SourceError> {
    let mut revision = Revision::new(new_revision_id(), head.cloned()).with_message(message);
    revision.created_at = Some(Utc::now());
    let path = write_revision(dir, &revision)?;
    Ok((revision, path))
}

/// Write `revision` as `<id>_<slug>.json`, refusing to overwrite.
pub fn write_revision(dir: &Path, revision: &Revision) -> Result<PathBuf, SourceError> {
    let name = match revision.message.as_deref().map(slug) {
        Some(s) if !s.is_empty() => format!("{}_{}.json", revision.id, s),
        _ => format!("{}.json", revision.id),
    };
    let path = dir.join(name);
    if path.exists() {
        return Err(SourceError::Exists { path });
    }

    let io_err = |source| SourceError::Io {
        path: path.clone(),
        source,
    };

    fs::create_dir_all(dir).map_err(io_err)?;
    let json = serde_json::to_string_pretty(revision).map_err(|source| SourceError::Parse {
        path: path.clone(),
        source,
    })?;

    // Write to a hidden temp file, then rename, so a partial file is never loaded.
    let temp_path = dir.join(format!(".{}.json.tmp", revision.id));
    {
        let mut file = fs::File::create(&temp_path).map_err(io_err)?;
        file.write_all(json.as_bytes()).map_err(io_err)?;
        file.write_all(b"\n").map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
    }
    fs::rename(&temp_path, &path).map_err(io_err)?;

    tracing::info!(path = %path.display(), "wrote revision {}", revision.id);
    Ok(path)
}
