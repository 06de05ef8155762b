//! Per-host outcomes of one run

use std::fmt::Write as _;
use std::path::PathBuf;

use colored::Colorize;
use serde::Serialize;

use crate::errors::CapstanError;
use crate::models::Revision;
use crate::release::ReleaseState;

/// Outcome of one host's worker
#[derive(Debug, Clone, Serialize)]
pub struct HostOutcome {
    pub host: String,
    pub success: bool,
    /// Last release state reached; none when the worker failed before staging
    pub state: Option<ReleaseState>,
    pub release: Option<PathBuf>,
    pub error: Option<String>,
    pub rollback_error: Option<String>,
}

impl HostOutcome {
    pub fn succeeded(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            success: true,
            state: None,
            release: None,
            error: None,
            rollback_error: None,
        }
    }

    pub fn failed(host: impl Into<String>, err: &CapstanError) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
            ..Self::succeeded(host)
        }
    }
}

/// Everything a `deploy` or `setup` run produced
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentReport {
    pub command: String,
    pub timestamp: Option<String>,
    pub revision: Option<Revision>,
    pub hosts: Vec<HostOutcome>,
}

impl DeploymentReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timestamp: None,
            revision: None,
            hosts: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.hosts.iter().all(|h| h.success)
    }

    pub fn host(&self, host: &str) -> Option<&HostOutcome> {
        self.hosts.iter().find(|h| h.host == host)
    }

    pub fn failed_hosts(&self) -> Vec<&str> {
        self.hosts
            .iter()
            .filter(|h| !h.success)
            .map(|h| h.host.as_str())
            .collect()
    }

    /// Human-readable summary
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, "{}", self.command.bold());
        if let Some(ts) = &self.timestamp {
            let _ = write!(out, " {}", ts);
        }
        if let Some(rev) = &self.revision {
            let _ = write!(out, " ({})", rev);
        }
        out.push('\n');

        for h in &self.hosts {
            let mark = if h.success { "OK".green() } else { "NG".red() };
            let _ = write!(out, "  [{}] {}", mark, h.host);
            if let Some(release) = &h.release {
                let _ = write!(out, " -> {}", release.display());
            }
            out.push('\n');
            if let Some(err) = &h.error {
                let _ = writeln!(out, "       {}", err.red());
            }
            if let Some(err) = &h.rollback_error {
                let _ = writeln!(out, "       rollback failed: {}", err.yellow());
            }
        }
        out
    }
}
