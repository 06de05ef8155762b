//! SSH transport and connection factory
//!
//! Host aliases, users and keys are resolved by the OpenSSH client itself
//! (`~/.ssh/config`). Each session multiplexes its commands over one master
//! connection through a private control socket.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::errors::CapstanError;
use crate::exec::{CommandOutput, Invocation, LocalTransport, Transport};
use crate::logs::LogSink;
use crate::remote::session::Session;
use crate::storage::settings::Server;
use crate::utils::is_local_host;

/// Opens sessions to servers
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, server: &Server) -> Result<Session, CapstanError>;
}

/// Runs commands on a server through the `ssh` client
#[derive(Debug, Clone)]
pub struct SshTransport {
    host: String,
    user: String,
    port: u16,
    identity_file: Option<String>,
    forward_agent: bool,
    control_path: PathBuf,
}

impl SshTransport {
    pub fn new(server: &Server, forward_agent: bool) -> Result<Self, CapstanError> {
        let identity_file = match &server.identity_file {
            Some(path) if !path.is_empty() => {
                let expanded = shellexpand::tilde(path).to_string();
                if !Path::new(&expanded).exists() {
                    return Err(CapstanError::ConnectError(format!(
                        "identity file not found for {}: {}",
                        server.host, expanded
                    )));
                }
                Some(expanded)
            }
            _ => None,
        };

        let control_path = std::env::temp_dir().join(format!(
            "capstan-{}",
            uuid::Uuid::new_v4().simple()
        ));

        Ok(Self {
            host: server.host.clone(),
            user: server.user.clone(),
            port: server.port,
            identity_file,
            forward_agent,
            control_path,
        })
    }

    /// `user@host`, or the bare host when no user is configured
    pub fn destination(&self) -> String {
        if self.user.is_empty() {
            self.host.clone()
        } else {
            format!("{}@{}", self.user, self.host)
        }
    }

    /// Connection options shared by every `ssh` invocation of this session
    pub fn ssh_options(&self) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(identity_file) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity_file.clone());
        }

        if self.port != 0 && self.port != 22 {
            args.push("-p".to_string());
            args.push(self.port.to_string());
        }

        if self.forward_agent {
            args.push("-A".to_string());
        }

        for option in [
            "BatchMode=yes".to_string(),
            "ConnectTimeout=10".to_string(),
            "ServerAliveInterval=15".to_string(),
            "ServerAliveCountMax=3".to_string(),
            "ControlMaster=auto".to_string(),
            format!("ControlPath={}", self.control_path.display()),
            "ControlPersist=60".to_string(),
        ] {
            args.push("-o".to_string());
            args.push(option);
        }

        args
    }
}

#[async_trait]
impl Transport for SshTransport {
    fn host(&self) -> &str {
        &self.host
    }

    async fn execute(&self, invocation: &Invocation) -> Result<CommandOutput, CapstanError> {
        let output = Command::new("ssh")
            .args(self.ssh_options())
            .arg(self.destination())
            .arg(invocation.to_line())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| CapstanError::ExecutionError(format!("SSH error: {}", e)))?;

        Ok(CommandOutput::from(output))
    }

    async fn close(&self) -> Result<(), CapstanError> {
        debug!("Closing SSH master for {}", self.host);
        Command::new("ssh")
            .args(self.ssh_options())
            .args(["-O", "exit"])
            .arg(self.destination())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| CapstanError::ConnectError(format!("SSH error: {}", e)))?;
        Ok(())
    }
}

/// Default connector: local execution for localhost, SSH otherwise
pub struct SshConnector {
    sink: Arc<dyn LogSink>,
    forward_agent: bool,
}

impl SshConnector {
    pub fn new(sink: Arc<dyn LogSink>, forward_agent: bool) -> Self {
        Self {
            sink,
            forward_agent,
        }
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self, server: &Server) -> Result<Session, CapstanError> {
        if is_local_host(&server.host) {
            debug!("Server '{}' is localhost, using local execution", server.host);
            return Ok(Session::new(
                server.clone(),
                Box::new(LocalTransport::new(server.host.clone())),
                self.sink.clone(),
            ));
        }

        let transport = SshTransport::new(server, self.forward_agent)?;

        // Establishes the master connection and proves authentication works.
        let probe = Invocation::shell("true");
        let out = transport.execute(&probe).await?;
        if !out.success {
            return Err(CapstanError::ConnectError(format!(
                "{}: {}",
                transport.destination(),
                out.failure_message(&probe)
            )));
        }

        Ok(Session::new(
            server.clone(),
            Box::new(transport),
            self.sink.clone(),
        ))
    }
}
