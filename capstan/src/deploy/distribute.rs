//! Pushing the snapshot to each server's cached copy

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::CapstanError;
use crate::exec::quote::quote_arg;
use crate::exec::{Chain, LocalTransport};
use crate::logs::{LogSink, StepStatus};
use crate::source::Snapshot;
use crate::storage::layout::ReleaseLayout;
use crate::storage::settings::Server;
use crate::utils::is_local_host;

/// Places a snapshot at `<deploy_to>/shared/cached-copy` on one server
#[async_trait]
pub trait Distributor: Send + Sync {
    async fn distribute(
        &self,
        server: &Server,
        layout: &ReleaseLayout,
        snapshot: &Snapshot,
    ) -> Result<(), CapstanError>;
}

/// rsync over SSH, or a plain copy for local hosts
pub struct RsyncDistributor {
    sink: Arc<dyn LogSink>,
    local_host: String,
}

impl RsyncDistributor {
    pub fn new(sink: Arc<dyn LogSink>, local_host: impl Into<String>) -> Self {
        Self {
            sink,
            local_host: local_host.into(),
        }
    }

    /// `-e` value for rsync, honouring the server's port and identity
    pub fn remote_shell(server: &Server) -> String {
        let mut shell = vec!["ssh".to_string(), "-o".into(), "BatchMode=yes".into()];
        if server.port != 0 && server.port != 22 {
            shell.push("-p".into());
            shell.push(server.port.to_string());
        }
        if let Some(identity) = server.identity_file.as_deref().filter(|i| !i.is_empty()) {
            shell.push("-i".into());
            shell.push(quote_arg(&shellexpand::tilde(identity)));
        }
        shell.join(" ")
    }

    /// `user@host:path` destination
    pub fn remote_target(server: &Server, layout: &ReleaseLayout) -> String {
        let path = layout.cached_copy().display().to_string();
        if server.user.is_empty() {
            format!("{}:{}", server.host, path)
        } else {
            format!("{}@{}:{}", server.user, server.host, path)
        }
    }
}

#[async_trait]
impl Distributor for RsyncDistributor {
    async fn distribute(
        &self,
        server: &Server,
        layout: &ReleaseLayout,
        snapshot: &Snapshot,
    ) -> Result<(), CapstanError> {
        let step = format!("Rsync from [{}] to [{}]", self.local_host, server.host);
        self.sink.step(&server.host, &step, StepStatus::Start);

        let src = snapshot.path().display().to_string();
        let mut cmd = Chain::new(LocalTransport::new(server.host.clone()), self.sink.clone());

        if is_local_host(&server.host) {
            let cached = layout.cached_copy().display().to_string();
            let shared = layout.shared_dir().display().to_string();
            let src = format!("{}/.", src);
            cmd.run("mkdir", &["-p", shared.as_str()]).await;
            cmd.run("rm", &["-rf", cached.as_str()]).await;
            cmd.run("cp", &["-RPp", src.as_str(), cached.as_str()]).await;
        } else {
            let src = format!("{}/", src);
            let shell = Self::remote_shell(server);
            let target = Self::remote_target(server, layout);
            cmd.run(
                "rsync",
                &["-lrptauz", "--delete", "-e", shell.as_str(), src.as_str(), target.as_str()],
            )
            .await;
        }

        match cmd.take_err() {
            None => {
                self.sink.step(&server.host, &step, StepStatus::Ok);
                Ok(())
            }
            Some(e) => {
                let e = CapstanError::DistributionError(e.message());
                self.sink.step(&server.host, &step, StepStatus::Failed);
                self.sink.error(&server.host, &e);
                Err(e)
            }
        }
    }
}
