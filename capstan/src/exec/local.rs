//! Local command execution

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;

use crate::errors::CapstanError;
use crate::exec::{Chain, CommandOutput, Invocation, Transport};
use crate::logs::LogSink;
use crate::utils::local_host_name;

/// Runs commands on this machine, shell lines through `sh -c`
#[derive(Debug, Clone)]
pub struct LocalTransport {
    host: String,
    current_dir: Option<PathBuf>,
}

impl LocalTransport {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            current_dir: None,
        }
    }

    /// Labelled with this machine's host name
    pub fn localhost() -> Self {
        Self::new(local_host_name())
    }

    pub fn current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    pub fn set_current_dir(&mut self, dir: Option<PathBuf>) {
        self.current_dir = dir;
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn host(&self) -> &str {
        &self.host
    }

    async fn execute(&self, invocation: &Invocation) -> Result<CommandOutput, CapstanError> {
        let mut cmd = match invocation {
            Invocation::Program { program, args } => {
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            }
            Invocation::Shell(line) => {
                let mut cmd = Command::new("sh");
                cmd.args(["-c", line.as_str()]);
                cmd
            }
        };

        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());

        let output = cmd.output().await.map_err(|e| {
            CapstanError::ExecutionError(format!("Failed to run {}: {}", invocation.name(), e))
        })?;

        Ok(CommandOutput::from(output))
    }
}

/// Local sticky-error executor
pub type LocalCmd = Chain<LocalTransport>;

impl Chain<LocalTransport> {
    /// Executor for this machine
    pub fn local(sink: Arc<dyn LogSink>) -> Self {
        Chain::new(LocalTransport::localhost(), sink)
    }

    /// Run subsequent commands inside `dir`
    pub fn set_dir(&mut self, dir: impl Into<PathBuf>) {
        self.transport_mut().set_current_dir(Some(dir.into()));
    }
}
