//! Release and revision models

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::storage::layout::{ReleaseLayout, REVISION_FILE};

/// Exact source state being deployed (a commit id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One release on one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Release {
    /// Directory name, `YYYYMMDDhhmmss`
    pub timestamp: String,
    pub revision: Revision,
    /// `<deploy_to>/releases/<timestamp>`
    pub path: PathBuf,
}

impl Release {
    pub fn new(layout: &ReleaseLayout, timestamp: impl Into<String>, revision: Revision) -> Self {
        let timestamp = timestamp.into();
        Self {
            path: layout.release_dir(&timestamp),
            timestamp,
            revision,
        }
    }

    pub fn revision_file(&self) -> PathBuf {
        self.path.join(REVISION_FILE)
    }
}
