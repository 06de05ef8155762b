//! Git-backed source cache

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::errors::CapstanError;
use crate::exec::LocalCmd;
use crate::filesys::dir::Dir;
use crate::logs::{LogSink, StepStatus};
use crate::models::Revision;
use crate::source::{Snapshot, Source};
use crate::storage::settings::Config;
use crate::utils::local_host_name;

/// Name of the local branch created on first checkout
const DEPLOY_BRANCH: &str = "deploy";

/// One local mirror of the repository.
///
/// Every git command runs with its working directory set to the cache; the
/// process working directory is never changed, so several caches can be
/// driven from one process.
pub struct GitCache {
    repo_url: String,
    branch: String,
    path: PathBuf,
    subdir: String,
    exclude: Vec<String>,
    submodules: bool,
    sink: Arc<dyn LogSink>,
    host: String,
}

impl GitCache {
    pub fn new(
        repo_url: impl Into<String>,
        branch: impl Into<String>,
        path: impl Into<PathBuf>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            repo_url: repo_url.into(),
            branch: branch.into(),
            path: path.into(),
            subdir: String::new(),
            exclude: Vec::new(),
            submodules: false,
            sink,
            host: local_host_name(),
        }
    }

    /// Cache configured from the deploy settings
    pub fn from_config(config: &Config, sink: Arc<dyn LogSink>) -> Self {
        Self::new(
            &config.git_repo_url,
            &config.git_branch,
            &config.deploy_cached_copy,
            sink,
        )
        .with_subdir(&config.deploy_subdir)
        .with_exclude(config.deploy_exclude.clone())
        .with_submodules(config.git_submodules)
    }

    pub fn with_subdir(mut self, subdir: impl Into<String>) -> Self {
        self.subdir = subdir.into();
        self
    }

    pub fn with_exclude(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }

    pub fn with_submodules(mut self, enabled: bool) -> Self {
        self.submodules = enabled;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub async fn is_cloned(&self) -> bool {
        Dir::new(&self.path).exists().await
    }

    /// Clone the repository when the cache does not exist yet
    pub async fn ensure_cloned(&self) -> Result<(), CapstanError> {
        let mut cmd = LocalCmd::local(self.sink.clone());
        self.clone_into(&mut cmd).await;
        cmd.finish().map_err(|e| CapstanError::SyncError(e.message()))
    }

    async fn clone_into(&self, cmd: &mut LocalCmd) {
        if self.is_cloned().await {
            return;
        }
        debug!("Cloning {} into {}", self.repo_url, self.path.display());
        let path = self.path.display().to_string();
        cmd.run(
            "git",
            &["clone", "-b", self.branch.as_str(), self.repo_url.as_str(), path.as_str()],
        )
        .await;
    }

    async fn resolve_revision(&self, cmd: &mut LocalCmd, branch: &str) -> String {
        let origin = format!("origin/{}", branch);
        cmd.output("git", &["rev-list", "--max-count=1", origin.as_str()])
            .await
    }

    async fn update_submodules(&self, cmd: &mut LocalCmd) {
        if !self.submodules {
            return;
        }
        cmd.run("git", &["submodule", "init"]).await;
        cmd.run("git", &["submodule", "sync"]).await;
        cmd.run("git", &["submodule", "update", "--init", "--recursive"])
            .await;
    }

    /// Make the cache current at the tip of `origin/<branch>`.
    ///
    /// A fresh cache is cloned and gets a local `deploy` branch; an existing
    /// one is fetched, hard-reset and cleaned of untracked and ignored files.
    pub async fn sync_to_revision(&self, branch: &str) -> Result<Revision, CapstanError> {
        let fresh = !self.is_cloned().await;
        let step = if fresh {
            "Git checkout repository"
        } else {
            "Git fetch repository"
        };
        self.sink.step(&self.host, step, StepStatus::Start);

        let mut cmd = LocalCmd::local(self.sink.clone());
        let rev = if fresh {
            self.checkout(&mut cmd, branch).await
        } else {
            self.fetch(&mut cmd, branch).await
        };

        let result = match cmd.take_err() {
            Some(e) => Err(CapstanError::SyncError(e.message())),
            None if rev.is_empty() => Err(CapstanError::SyncError(format!(
                "no revision found for origin/{}",
                branch
            ))),
            None => Ok(Revision::new(rev)),
        };

        match &result {
            Ok(rev) => {
                self.sink.step(&self.host, step, StepStatus::Ok);
                info!("Resolved revision {} from origin/{}", rev, branch);
            }
            Err(e) => {
                self.sink.step(&self.host, step, StepStatus::Failed);
                self.sink.error(&self.host, e);
            }
        }
        result
    }

    async fn checkout(&self, cmd: &mut LocalCmd, branch: &str) -> String {
        self.clone_into(cmd).await;
        cmd.set_dir(&self.path);

        let rev = self.resolve_revision(cmd, branch).await;
        if cmd.is_ok() && !rev.is_empty() {
            let existing = cmd.output("git", &["branch", "--list", DEPLOY_BRANCH]).await;
            if cmd.is_ok() && existing.is_empty() {
                cmd.run("git", &["checkout", "-b", DEPLOY_BRANCH, rev.as_str()])
                    .await;
            }
        }
        self.update_submodules(cmd).await;
        rev
    }

    async fn fetch(&self, cmd: &mut LocalCmd, branch: &str) -> String {
        cmd.set_dir(&self.path);
        cmd.run("git", &["fetch", "origin"]).await;
        cmd.run("git", &["fetch", "--tags", "origin"]).await;

        let rev = self.resolve_revision(cmd, branch).await;
        if cmd.is_ok() && !rev.is_empty() {
            cmd.run("git", &["reset", "--hard", rev.as_str()]).await;
        }
        self.update_submodules(cmd).await;
        cmd.run("git", &["clean", "-d", "-x", "-f"]).await;
        rev
    }

    /// Directory inside the cache that gets deployed
    pub fn source_dir(&self) -> PathBuf {
        if self.subdir.is_empty() {
            self.path.clone()
        } else {
            self.path.join(&self.subdir)
        }
    }

    /// Copy the deployed part of the cache into a fresh temporary directory.
    ///
    /// With exclude patterns the copy is made with rsync, otherwise with
    /// `cp -RPp`. The directory is removed again if the copy fails.
    pub async fn snapshot(&self) -> Result<Snapshot, CapstanError> {
        let step = "Update local src";
        self.sink.step(&self.host, step, StepStatus::Start);

        let dir = Dir::create_temp_dir("capstan-snapshot").await?;
        let src = self.source_dir().display().to_string();
        let dst = dir.path().display().to_string();

        let mut cmd = LocalCmd::local(self.sink.clone());
        if self.exclude.is_empty() {
            let src = format!("{}/.", src);
            cmd.run("cp", &["-RPp", src.as_str(), dst.as_str()]).await;
        } else {
            let mut args = vec!["-lrpta".to_string()];
            for pattern in &self.exclude {
                args.push("--exclude".to_string());
                args.push(pattern.clone());
            }
            args.push(format!("{}/", src));
            args.push(dst);
            cmd.run("rsync", &args[..]).await;
        }

        let snapshot = Snapshot::from_dir(dir);
        match cmd.take_err() {
            Some(e) => {
                snapshot.remove().await;
                let e = CapstanError::SyncError(e.message());
                self.sink.step(&self.host, step, StepStatus::Failed);
                self.sink.error(&self.host, &e);
                Err(e)
            }
            None => {
                self.sink.step(&self.host, step, StepStatus::Ok);
                Ok(snapshot)
            }
        }
    }
}

#[async_trait]
impl Source for GitCache {
    async fn sync(&self) -> Result<Revision, CapstanError> {
        self.sync_to_revision(&self.branch).await
    }

    async fn snapshot(&self) -> Result<Snapshot, CapstanError> {
        GitCache::snapshot(self).await
    }
}
