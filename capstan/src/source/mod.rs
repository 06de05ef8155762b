//! Local source cache and snapshots

pub mod git;
pub mod snapshot;

use async_trait::async_trait;

use crate::errors::CapstanError;
use crate::models::Revision;

pub use git::GitCache;
pub use snapshot::Snapshot;

/// Produces the revision and content a deployment ships
#[async_trait]
pub trait Source: Send + Sync {
    /// Bring the cache up to date and pin the revision for this run
    async fn sync(&self) -> Result<Revision, CapstanError>;

    /// Detached copy of the cache, owned by the caller
    async fn snapshot(&self) -> Result<Snapshot, CapstanError>;
}
