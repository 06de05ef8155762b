//! Detached snapshot directories

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::filesys::dir::Dir;

/// Temporary directory holding the content of one revision.
///
/// Read-only once produced; the orchestrator removes it after every host
/// worker has finished.
#[derive(Debug, Clone)]
pub struct Snapshot {
    dir: Dir,
}

impl Snapshot {
    /// Wrap an existing directory
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            dir: Dir::new(path),
        }
    }

    pub(crate) fn from_dir(dir: Dir) -> Self {
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Delete the snapshot from disk
    pub async fn remove(&self) {
        if let Err(e) = self.dir.delete().await {
            warn!("Failed to remove snapshot {}: {}", self.path().display(), e);
        }
    }

    pub async fn exists(&self) -> bool {
        self.dir.exists().await
    }
}
