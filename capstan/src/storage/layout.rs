//! Filesystem layout of a deploy root on one server
//!
//! ```text
//! <deploy_to>/
//!   releases/<YYYYMMDDhhmmss>/
//!   releases/<timestamp>/REVISION
//!   shared/
//!   shared/cached-copy/
//!   current -> releases/<timestamp>
//! ```

use std::path::{Path, PathBuf};

/// Name of the revision marker inside each release
pub const REVISION_FILE: &str = "REVISION";

/// Paths derived from one deploy root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseLayout {
    /// Root of the deployment
    pub deploy_to: PathBuf,
}

impl ReleaseLayout {
    pub fn new(deploy_to: impl Into<PathBuf>) -> Self {
        Self {
            deploy_to: deploy_to.into(),
        }
    }

    pub fn deploy_to(&self) -> &Path {
        &self.deploy_to
    }

    /// Directory holding one subdirectory per release
    pub fn releases_dir(&self) -> PathBuf {
        self.deploy_to.join("releases")
    }

    /// Persistent state reused by every release
    pub fn shared_dir(&self) -> PathBuf {
        self.deploy_to.join("shared")
    }

    /// Symlink to the live release
    pub fn current_link(&self) -> PathBuf {
        self.deploy_to.join("current")
    }

    /// Host-local copy of the snapshot that releases are staged from
    pub fn cached_copy(&self) -> PathBuf {
        self.shared_dir().join("cached-copy")
    }

    pub fn release_dir(&self, timestamp: &str) -> PathBuf {
        self.releases_dir().join(timestamp)
    }

    /// A shared directory or file, by its path relative to the release root
    pub fn shared_path(&self, relative: &str) -> PathBuf {
        self.shared_dir().join(relative)
    }
}
