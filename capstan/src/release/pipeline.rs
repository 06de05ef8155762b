//! Per-host release sequence: stage, link shared, hook, activate, prune

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::app::state::DeployContext;
use crate::errors::CapstanError;
use crate::exec::quote::quote_arg;
use crate::hooks::{AppHook, HookContext};
use crate::logs::StepStatus;
use crate::models::{Release, Revision};
use crate::release::fsm::{ReleaseEvent, ReleaseFsm, ReleaseState};
use crate::remote::Session;
use crate::storage::layout::ReleaseLayout;
use crate::utils::is_release_timestamp;

const STEP_STAGE: &str = "Create latest release";
const STEP_LINK: &str = "Symlinks static directories and static files";
const STEP_ACTIVATE: &str = "Updates latest release";
const STEP_PRUNE: &str = "Cleanup old releases";
const STEP_ROLLBACK: &str = "Rollback";

/// Drives one release through its states on one host.
///
/// Steps run strictly in order and each one refuses to start unless the
/// previous one completed, so `current` is only ever moved to a release
/// that is fully staged and linked.
pub struct ReleasePipeline {
    ctx: Arc<DeployContext>,
    layout: ReleaseLayout,
    release: Release,
    fsm: ReleaseFsm,
    created: bool,
}

impl ReleasePipeline {
    pub fn new(
        ctx: Arc<DeployContext>,
        layout: ReleaseLayout,
        timestamp: &str,
        revision: Revision,
    ) -> Self {
        let release = Release::new(&layout, timestamp, revision);
        Self {
            ctx,
            layout,
            release,
            fsm: ReleaseFsm::new(),
            created: false,
        }
    }

    pub fn release(&self) -> &Release {
        &self.release
    }

    pub fn state(&self) -> ReleaseState {
        self.fsm.state()
    }

    /// Run the whole sequence. Prune is skipped when anything before it
    /// failed.
    pub async fn run(
        &mut self,
        session: &mut Session,
        hook: &dyn AppHook,
    ) -> Result<(), CapstanError> {
        self.stage(session).await?;
        self.link_shared(session).await?;
        self.run_hook(session, hook).await?;
        self.activate(session).await?;
        self.prune(session).await?;
        Ok(())
    }

    fn expect_state(&self, expected: ReleaseState) -> Result<(), CapstanError> {
        if self.fsm.state() != expected {
            return Err(CapstanError::StateError(format!(
                "release {} is {:?}, expected {:?}",
                self.release.timestamp,
                self.fsm.state(),
                expected
            )));
        }
        Ok(())
    }

    /// Copy the host-local cached copy into `releases/<timestamp>`, record
    /// the revision and open group write permissions.
    pub async fn stage(&mut self, session: &mut Session) -> Result<(), CapstanError> {
        self.expect_state(ReleaseState::Pending)?;
        let host = session.host().to_string();
        session.sink().step(&host, STEP_STAGE, StepStatus::Start);

        let release = path_arg(&self.release.path);
        let cached = path_arg(&self.layout.cached_copy());

        if session.exists(&self.release.path).await {
            session.fail(CapstanError::ExecutionError(format!(
                "release directory already exists: {}",
                release
            )));
        }
        if session.is_ok() {
            self.created = true;
        }

        session
            .exec("mkdir", &["-p", path_arg(&self.layout.releases_dir()).as_str()])
            .await;
        session
            .exec("cp", &["-RPp", cached.as_str(), release.as_str()])
            .await;
        session
            .run(&format!(
                "echo {} > {}",
                quote_arg(self.release.revision.as_str()),
                quote_arg(&path_arg(&self.release.revision_file()))
            ))
            .await;
        session.exec("chmod", &["-R", "g+w", release.as_str()]).await;

        self.complete(session, STEP_STAGE, ReleaseEvent::Stage, CapstanError::StageError)
    }

    /// Replace configured paths inside the release with links into `shared/`.
    ///
    /// Directories are processed before files, each list in configuration
    /// order. Missing shared files are created empty; existing ones are
    /// left untouched.
    pub async fn link_shared(&mut self, session: &mut Session) -> Result<(), CapstanError> {
        self.expect_state(ReleaseState::Staged)?;
        let host = session.host().to_string();
        session.sink().step(&host, STEP_LINK, StepStatus::Start);

        let config = &self.ctx.config;
        for dir in &config.shared_dirs {
            let shared = self.layout.shared_path(dir);
            let target = self.release.path.join(dir);
            session.exec("mkdir", &["-p", path_arg(&shared).as_str()]).await;
            session.exec("rm", &["-rf", path_arg(&target).as_str()]).await;
            ensure_parent(session, &target).await;
            session
                .exec(
                    "ln",
                    &["-nfs", path_arg(&shared).as_str(), path_arg(&target).as_str()],
                )
                .await;
        }

        for file in &config.shared_files {
            let shared = self.layout.shared_path(file);
            let target = self.release.path.join(file);
            ensure_parent(session, &shared).await;
            let quoted = quote_arg(&path_arg(&shared));
            session
                .run(&format!("test -e {} || touch {}", quoted, quoted))
                .await;
            ensure_parent(session, &target).await;
            session
                .exec(
                    "ln",
                    &["-nfs", path_arg(&shared).as_str(), path_arg(&target).as_str()],
                )
                .await;
        }

        self.complete(
            session,
            STEP_LINK,
            ReleaseEvent::LinkShared,
            CapstanError::StageError,
        )
    }

    /// Invoke the application hook on the linked release.
    ///
    /// A failure latched in the session and an error returned by the hook
    /// are treated the same way.
    pub async fn run_hook(
        &mut self,
        session: &mut Session,
        hook: &dyn AppHook,
    ) -> Result<(), CapstanError> {
        self.expect_state(ReleaseState::SharedLinked)?;
        let host = session.host().to_string();
        let step = format!("Run {} hook", hook.name());
        session.sink().step(&host, &step, StepStatus::Start);

        let hook_ctx = HookContext::new(self.ctx.clone(), self.layout.clone());
        if let Err(e) = hook.after_stage(session, &hook_ctx, &self.release).await {
            session.fail(e);
        }

        match session.take_err() {
            None => {
                session.sink().step(&host, &step, StepStatus::Ok);
                Ok(())
            }
            Some(e) => {
                let e = CapstanError::StageError(e.message());
                self.record_failure(session, &step, &e)?;
                Err(e)
            }
        }
    }

    /// Point `current` at the release with a single rename.
    ///
    /// The new link is created beside `current` and moved over it, so a
    /// reader resolves either the old or the new release.
    pub async fn activate(&mut self, session: &mut Session) -> Result<(), CapstanError> {
        self.expect_state(ReleaseState::SharedLinked)?;
        let host = session.host().to_string();
        session.sink().step(&host, STEP_ACTIVATE, StepStatus::Start);

        let current = path_arg(&self.layout.current_link());
        let staging = format!("{}.{}", current, self.release.timestamp);
        let release = path_arg(&self.release.path);

        session
            .exec("ln", &["-sfn", release.as_str(), staging.as_str()])
            .await;
        session
            .exec("mv", &["-Tf", staging.as_str(), current.as_str()])
            .await;

        match session.take_err() {
            None => {
                self.fsm.process(ReleaseEvent::Activate)?;
                session.sink().step(&host, STEP_ACTIVATE, StepStatus::Ok);
                Ok(())
            }
            Some(e) => {
                session.exec("rm", &["-f", staging.as_str()]).await;
                if let Some(cleanup) = session.take_err() {
                    warn!(host = %host, "Failed to remove {}: {}", staging, cleanup);
                }
                let e = CapstanError::ActivationError(e.message());
                self.record_failure(session, STEP_ACTIVATE, &e)?;
                Err(e)
            }
        }
    }

    /// Remove releases beyond the retention window, newest kept first.
    ///
    /// Only directories named like release timestamps are considered and the
    /// active release is never removed. Returns the removed names.
    pub async fn prune(&mut self, session: &mut Session) -> Result<Vec<String>, CapstanError> {
        self.expect_state(ReleaseState::Activated)?;
        let host = session.host().to_string();
        session.sink().step(&host, STEP_PRUNE, StepStatus::Start);

        let keep = self.ctx.config.deploy_keep_releases;
        let listing = session
            .exec("ls", &["-1", path_arg(&self.layout.releases_dir()).as_str()])
            .await;
        let expired = expired_releases(&listing, keep, &self.release.timestamp);

        for name in &expired {
            let path = self.layout.release_dir(name);
            session.exec("rm", &["-rf", path_arg(&path).as_str()]).await;
        }

        match session.take_err() {
            None => {
                debug!(host = %host, "Pruned {} release(s)", expired.len());
                session.sink().step(&host, STEP_PRUNE, StepStatus::Ok);
                Ok(expired)
            }
            Some(e) => {
                let e = CapstanError::PruneError(e.message());
                session.sink().step(&host, STEP_PRUNE, StepStatus::Failed);
                session.sink().error(&host, &e);
                Err(e)
            }
        }
    }

    /// Remove the release directory of a failed attempt.
    ///
    /// Clears any failure latched in the session first. `current` is never
    /// touched. A failed rollback is reported, not retried.
    pub async fn rollback(&mut self, session: &mut Session) -> Result<(), CapstanError> {
        self.expect_state(ReleaseState::Failed)?;
        let host = session.host().to_string();
        session.take_err();

        if !self.created {
            debug!(host = %host, "Nothing was created, skipping rollback");
            return Ok(());
        }

        session.sink().step(&host, STEP_ROLLBACK, StepStatus::Start);
        session
            .exec("rm", &["-Rf", path_arg(&self.release.path).as_str()])
            .await;

        match session.take_err() {
            None => {
                self.fsm.process(ReleaseEvent::RollBack)?;
                session.sink().step(&host, STEP_ROLLBACK, StepStatus::Ok);
                Ok(())
            }
            Some(e) => {
                session.sink().step(&host, STEP_ROLLBACK, StepStatus::Failed);
                session.sink().error(&host, &e);
                Err(e)
            }
        }
    }

    /// Turn the session's latched failure into a step outcome
    fn complete(
        &mut self,
        session: &mut Session,
        step: &str,
        event: ReleaseEvent,
        kind: fn(String) -> CapstanError,
    ) -> Result<(), CapstanError> {
        let host = session.host().to_string();
        match session.take_err() {
            None => {
                self.fsm.process(event)?;
                session.sink().step(&host, step, StepStatus::Ok);
                Ok(())
            }
            Some(e) => {
                let e = kind(e.message());
                self.record_failure(session, step, &e)?;
                Err(e)
            }
        }
    }

    fn record_failure(
        &mut self,
        session: &Session,
        step: &str,
        err: &CapstanError,
    ) -> Result<(), CapstanError> {
        let host = session.host();
        session.sink().step(host, step, StepStatus::Failed);
        session.sink().error(host, err);
        self.fsm.process(ReleaseEvent::Fail(err.message()))
    }
}

async fn ensure_parent(session: &mut Session, path: &Path) {
    if let Some(parent) = path.parent() {
        session.exec("mkdir", &["-p", path_arg(parent).as_str()]).await;
    }
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

/// Release names to delete: valid timestamps sorted newest first, minus the
/// first `keep` and minus `active`.
pub fn expired_releases(listing: &str, keep: usize, active: &str) -> Vec<String> {
    let mut names: Vec<&str> = listing
        .lines()
        .map(str::trim)
        .filter(|name| is_release_timestamp(name))
        .collect();
    names.sort_unstable_by(|a, b| b.cmp(a));
    names
        .into_iter()
        .skip(keep)
        .filter(|name| *name != active)
        .map(str::to_string)
        .collect()
}
