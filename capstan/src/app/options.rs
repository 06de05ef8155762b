//! Invocation options

use std::path::PathBuf;

use crate::logs::LogLevel;
use crate::storage::settings::DEFAULT_CONFIG_PATH;

/// Which top-level command to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Deploy,
    Setup,
    Init,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Deploy => "deploy",
            Command::Setup => "setup",
            Command::Init => "init",
        }
    }
}

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Base configuration file
    pub config_path: PathBuf,

    /// Stage to load, `stage_default` when unset
    pub stage: Option<String>,

    /// Overrides the configured log level
    pub log_level: Option<LogLevel>,

    /// Print the report as JSON
    pub json: bool,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            stage: None,
            log_level: None,
            json: false,
        }
    }
}
