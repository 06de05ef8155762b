//! Multi-host deployment: one worker per server, joined before returning

use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, info_span, warn, Instrument};

use crate::app::state::DeployContext;
use crate::deploy::distribute::Distributor;
use crate::deploy::report::{DeploymentReport, HostOutcome};
use crate::errors::CapstanError;
use crate::hooks::{AppHook, HookContext};
use crate::logs::{LogSink, StepStatus};
use crate::models::Revision;
use crate::release::ReleasePipeline;
use crate::remote::{Connector, Session};
use crate::source::{Snapshot, Source};
use crate::storage::settings::Server;
use crate::utils::{is_release_timestamp, release_timestamp};

/// Runs `deploy` and `setup` across every configured server.
///
/// Hosts never share mutable state: each worker gets its own session and
/// touches only its own deploy root. A failing host does not cancel the
/// others and the run returns only after every worker finished.
pub struct Deployer {
    ctx: Arc<DeployContext>,
    source: Arc<dyn Source>,
    connector: Arc<dyn Connector>,
    distributor: Arc<dyn Distributor>,
    hook: Arc<dyn AppHook>,
    sink: Arc<dyn LogSink>,
}

/// Shared handles cloned into every worker
#[derive(Clone)]
struct Worker {
    ctx: Arc<DeployContext>,
    connector: Arc<dyn Connector>,
    distributor: Arc<dyn Distributor>,
    hook: Arc<dyn AppHook>,
    sink: Arc<dyn LogSink>,
}

impl Deployer {
    pub fn new(
        ctx: Arc<DeployContext>,
        source: Arc<dyn Source>,
        connector: Arc<dyn Connector>,
        distributor: Arc<dyn Distributor>,
        hook: Arc<dyn AppHook>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            ctx,
            source,
            connector,
            distributor,
            hook,
            sink,
        }
    }

    pub fn context(&self) -> &Arc<DeployContext> {
        &self.ctx
    }

    fn worker(&self) -> Worker {
        Worker {
            ctx: self.ctx.clone(),
            connector: self.connector.clone(),
            distributor: self.distributor.clone(),
            hook: self.hook.clone(),
            sink: self.sink.clone(),
        }
    }

    /// Deploy a new release stamped with the current local time
    pub async fn deploy(&self) -> Result<DeploymentReport, CapstanError> {
        self.deploy_at(&release_timestamp()).await
    }

    /// Deploy a new release named `timestamp`.
    ///
    /// The revision and snapshot are produced once, before any worker starts.
    /// A sync failure aborts the run; host failures end up in the report.
    pub async fn deploy_at(&self, timestamp: &str) -> Result<DeploymentReport, CapstanError> {
        if !is_release_timestamp(timestamp) {
            return Err(CapstanError::ConfigError(format!(
                "invalid release timestamp: {}",
                timestamp
            )));
        }

        let revision = self.source.sync().await?;
        let snapshot = self.source.snapshot().await?;
        info!(
            "Deploying {} as release {} to {} server(s)",
            revision,
            timestamp,
            self.ctx.servers().len()
        );

        let handles: Vec<_> = self
            .ctx
            .servers()
            .iter()
            .cloned()
            .map(|server| {
                let worker = self.worker();
                let span = info_span!("deploy", host = %server.host);
                let timestamp = timestamp.to_string();
                let revision = revision.clone();
                let snapshot = snapshot.clone();
                tokio::spawn(
                    async move { worker.deploy_host(server, timestamp, revision, snapshot).await }
                        .instrument(span),
                )
            })
            .collect();

        let results = join_all(handles).await;
        snapshot.remove().await;

        let mut report = DeploymentReport::new("deploy");
        report.timestamp = Some(timestamp.to_string());
        report.revision = Some(revision);
        report.hosts = self.collect(results);
        Ok(report)
    }

    /// Prepare the deploy root on every server, then run the hook's setup
    pub async fn setup(&self) -> Result<DeploymentReport, CapstanError> {
        let handles: Vec<_> = self
            .ctx
            .servers()
            .iter()
            .cloned()
            .map(|server| {
                let worker = self.worker();
                let span = info_span!("setup", host = %server.host);
                tokio::spawn(async move { worker.setup_host(server).await }.instrument(span))
            })
            .collect();

        let results = join_all(handles).await;
        let mut report = DeploymentReport::new("setup");
        report.hosts = self.collect(results);
        Ok(report)
    }

    /// Outcomes in configuration order; a panicked worker counts as failed
    fn collect(
        &self,
        results: Vec<Result<HostOutcome, tokio::task::JoinError>>,
    ) -> Vec<HostOutcome> {
        self.ctx
            .servers()
            .iter()
            .zip(results)
            .map(|(server, result)| match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    let e = CapstanError::Internal(format!("worker failed: {}", e));
                    self.sink.error(&server.host, &e);
                    HostOutcome::failed(&server.host, &e)
                }
            })
            .collect()
    }
}

impl Worker {
    async fn connect(&self, server: &Server) -> Result<Session, CapstanError> {
        self.connector.connect(server).await.inspect_err(|e| {
            self.sink.error(&server.host, e);
        })
    }

    async fn close(&self, session: Session) {
        let host = session.host().to_string();
        if let Err(e) = session.close().await {
            warn!(host = %host, "Failed to close session: {}", e);
        }
    }

    async fn deploy_host(
        self,
        server: Server,
        timestamp: String,
        revision: Revision,
        snapshot: Snapshot,
    ) -> HostOutcome {
        info!(host = %server.host, "##### Start deploy #####");
        let layout = self.ctx.layout_for(&server);

        if let Err(e) = self.distributor.distribute(&server, &layout, &snapshot).await {
            return HostOutcome::failed(&server.host, &e);
        }

        let mut session = match self.connect(&server).await {
            Ok(session) => session,
            Err(e) => return HostOutcome::failed(&server.host, &e),
        };

        let mut pipeline = ReleasePipeline::new(self.ctx.clone(), layout, &timestamp, revision);
        let result = pipeline.run(&mut session, self.hook.as_ref()).await;

        let mut outcome = match &result {
            Ok(()) => {
                let mut outcome = HostOutcome::succeeded(&server.host);
                outcome.release = Some(pipeline.release().path.clone());
                outcome
            }
            Err(e) => HostOutcome::failed(&server.host, e),
        };

        if let Err(e) = &result {
            if e.needs_rollback() {
                info!(host = %server.host, "Rolling back release {}", timestamp);
                if let Err(rb) = pipeline.rollback(&mut session).await {
                    outcome.rollback_error = Some(rb.to_string());
                }
            }
        }

        outcome.state = Some(pipeline.state());
        self.close(session).await;
        outcome
    }

    async fn setup_host(self, server: Server) -> HostOutcome {
        info!(host = %server.host, "-----> Start deploy setup");
        let layout = self.ctx.layout_for(&server);
        let mut session = match self.connect(&server).await {
            Ok(session) => session,
            Err(e) => return HostOutcome::failed(&server.host, &e),
        };

        let step = "Creates dirs of deploy, releases, shared";
        self.sink.step(&server.host, step, StepStatus::Start);
        let dirs = [
            layout.deploy_to().display().to_string(),
            layout.releases_dir().display().to_string(),
            layout.shared_dir().display().to_string(),
        ];
        let mut args = vec!["-p".to_string()];
        args.extend(dirs.iter().cloned());
        session.exec("mkdir", &args[..]).await;
        let mut args = vec!["g+w".to_string()];
        args.extend(dirs.iter().cloned());
        session.exec("chmod", &args[..]).await;

        let result = match session.finish() {
            Ok(()) => {
                self.sink.step(&server.host, step, StepStatus::Ok);
                let hook_ctx = HookContext::new(self.ctx.clone(), layout);
                self.hook.setup(&mut session, &hook_ctx).await
            }
            Err(e) => {
                self.sink.step(&server.host, step, StepStatus::Failed);
                self.sink.error(&server.host, &e);
                Err(e)
            }
        };

        self.close(session).await;
        match result {
            Ok(()) => HostOutcome::succeeded(&server.host),
            Err(e) => HostOutcome::failed(&server.host, &e),
        }
    }
}
