//! Immutable per-invocation deploy context

use tracing::info;

use crate::errors::CapstanError;
use crate::storage::layout::ReleaseLayout;
use crate::storage::settings::{Config, Server};
use crate::utils::local_host_name;

/// Everything derived from the configuration, built once before any host
/// worker starts and shared read-only behind an `Arc`.
#[derive(Debug, Clone)]
pub struct DeployContext {
    pub config: Config,

    /// Label of this machine in log lines
    pub local_host: String,
}

impl DeployContext {
    /// Validate the configuration and wrap it
    pub fn new(config: Config) -> Result<Self, CapstanError> {
        config.validate()?;
        info!(
            "Loaded configuration for '{}' with {} server(s)",
            config.name,
            config.servers.len()
        );
        Ok(Self {
            config,
            local_host: local_host_name(),
        })
    }

    /// Layout of the deploy root on `server`
    pub fn layout_for(&self, server: &Server) -> ReleaseLayout {
        let root = server
            .deploy_to
            .clone()
            .unwrap_or_else(|| self.config.deploy_to.clone());
        ReleaseLayout::new(root)
    }

    pub fn servers(&self) -> &[Server] {
        &self.config.servers
    }
}
