//! Deploy configuration: base file merged with a stage file

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::CapstanError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Default location of the base configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/deploy.toml";

/// A server releases are deployed to. Identity is the host address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    /// Host address or SSH alias
    pub host: String,

    /// SSH port, 0 inherits `ssh_port`
    #[serde(default)]
    pub port: u16,

    /// SSH user, empty inherits `ssh_user`
    #[serde(default)]
    pub user: String,

    /// Informational; no step is gated on roles
    #[serde(default)]
    pub roles: Vec<String>,

    /// User the web server process runs as
    #[serde(default)]
    pub web_user: String,

    #[serde(default)]
    pub php_bin: String,

    #[serde(default)]
    pub identity_file: Option<String>,

    /// Overrides the global `deploy_to` for this server
    #[serde(default)]
    pub deploy_to: Option<PathBuf>,
}

impl Server {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 0,
            user: String::new(),
            roles: Vec::new(),
            web_user: String::new(),
            php_bin: String::new(),
            identity_file: None,
            deploy_to: None,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Fully merged configuration for one invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: LogLevel,

    /// Optional file logs are appended to
    pub log_file: Option<PathBuf>,

    /// `KEY=VALUE` pairs exported to application hooks
    pub env: Vec<String>,

    /// Application name
    pub name: String,

    pub git_repo_url: String,
    pub git_branch: String,
    pub git_submodules: bool,

    pub writable_dirs: Vec<String>,
    pub shared_dirs: Vec<String>,
    pub shared_files: Vec<String>,

    /// Directory holding `<stage>.toml` files
    pub stage_dir: PathBuf,
    pub stage_default: String,

    /// Application hook to run after staging (`symfony`), none when unset
    pub framework: Option<String>,
    pub symfony_env: String,

    pub ssh_user: String,
    pub ssh_port: u16,
    pub ssh_forward_agent: bool,
    pub identity_file: Option<String>,
    pub web_user: String,
    pub php_bin: String,

    pub deploy_to: PathBuf,
    /// Subdirectory of the repository that gets deployed
    pub deploy_subdir: String,
    pub deploy_keep_releases: usize,
    /// Local path of the source cache
    pub deploy_cached_copy: PathBuf,
    /// Exclude patterns; when non-empty the snapshot is built with rsync
    pub deploy_exclude: Vec<String>,

    pub servers: Vec<Server>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_file: None,
            env: Vec::new(),
            name: String::new(),
            git_repo_url: String::new(),
            git_branch: "master".to_string(),
            git_submodules: false,
            writable_dirs: Vec::new(),
            shared_dirs: Vec::new(),
            shared_files: Vec::new(),
            stage_dir: PathBuf::from("config/deploy"),
            stage_default: "prod".to_string(),
            framework: None,
            symfony_env: "prod".to_string(),
            ssh_user: String::new(),
            ssh_port: 22,
            ssh_forward_agent: false,
            identity_file: None,
            web_user: String::new(),
            php_bin: "php".to_string(),
            deploy_to: PathBuf::new(),
            deploy_subdir: String::new(),
            deploy_keep_releases: 5,
            deploy_cached_copy: PathBuf::from("tmp/cached-copy"),
            deploy_exclude: Vec::new(),
            servers: Vec::new(),
        }
    }
}

impl Config {
    /// Load the base file and the stage file it points to.
    ///
    /// `stage` falls back to `stage_default`. A relative `stage_dir` is
    /// resolved against the working directory.
    pub async fn load(base_path: &Path, stage: Option<&str>) -> Result<Config, CapstanError> {
        let base_file = File::new(base_path);
        if !base_file.exists().await {
            return Err(CapstanError::ConfigError(format!(
                "Config file not found: {}",
                base_path.display()
            )));
        }
        let base = base_file.read_string().await?;
        let base_table: toml::Table = base.parse()?;

        let stage = stage
            .map(str::to_string)
            .or_else(|| {
                base_table
                    .get("stage_default")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| Config::default().stage_default);

        let stage_dir = base_table
            .get("stage_dir")
            .and_then(|v| v.as_str())
            .map(PathBuf::from)
            .unwrap_or_else(|| Config::default().stage_dir);

        let stage_path = stage_dir.join(format!("{}.toml", stage));
        let stage_file = File::new(&stage_path);
        if !stage_file.exists().await {
            return Err(CapstanError::ConfigError(format!(
                "Stage file not found for stage '{}': {}",
                stage,
                stage_path.display()
            )));
        }
        debug!("Loading stage '{}' from {}", stage, stage_path.display());
        let stage_src = stage_file.read_string().await?;

        Config::from_sources(&base, Some(&stage_src))
    }

    /// Merge a base document with an optional stage document and resolve
    /// per-server defaults.
    pub fn from_sources(base: &str, stage: Option<&str>) -> Result<Config, CapstanError> {
        let mut merged: toml::Table = base.parse()?;
        if let Some(stage) = stage {
            let overlay: toml::Table = stage.parse()?;
            merge_tables(&mut merged, overlay);
        }

        let mut config = toml::Value::Table(merged).try_into::<Config>()?;
        config.resolve_servers();
        Ok(config)
    }

    /// Fill unset server fields from the global section
    fn resolve_servers(&mut self) {
        for server in &mut self.servers {
            if server.user.is_empty() {
                server.user = self.ssh_user.clone();
            }
            if server.port == 0 {
                server.port = self.ssh_port;
            }
            if server.web_user.is_empty() {
                server.web_user = self.web_user.clone();
            }
            if server.php_bin.is_empty() {
                server.php_bin = self.php_bin.clone();
            }
            if server.identity_file.is_none() {
                server.identity_file = self.identity_file.clone();
            }
        }
    }

    /// Check everything `deploy` and `setup` rely on
    pub fn validate(&self) -> Result<(), CapstanError> {
        if self.deploy_to.as_os_str().is_empty() {
            return Err(CapstanError::ConfigError("deploy_to is not set".to_string()));
        }
        if self.git_repo_url.is_empty() {
            return Err(CapstanError::ConfigError("git_repo_url is not set".to_string()));
        }
        if self.git_branch.is_empty() {
            return Err(CapstanError::ConfigError("git_branch is not set".to_string()));
        }
        if self.servers.is_empty() {
            return Err(CapstanError::ConfigError("no servers configured".to_string()));
        }
        if self.deploy_keep_releases == 0 {
            return Err(CapstanError::ConfigError(
                "deploy_keep_releases must be at least 1".to_string(),
            ));
        }
        for server in &self.servers {
            if server.host.is_empty() {
                return Err(CapstanError::ConfigError("server without host".to_string()));
            }
        }
        for path in self
            .shared_dirs
            .iter()
            .chain(&self.shared_files)
            .chain(&self.writable_dirs)
        {
            validate_relative(path)?;
        }
        Ok(())
    }

    /// Whether a writable dir lives under `shared/`
    pub fn is_shared_dir(&self, dir: &str) -> bool {
        self.shared_dirs.iter().any(|d| d == dir)
    }
}

fn validate_relative(path: &str) -> Result<(), CapstanError> {
    let p = Path::new(path);
    let escapes = p
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    let names_entry = p.components().any(|c| matches!(c, Component::Normal(_)));
    if escapes || !names_entry {
        return Err(CapstanError::ConfigError(format!(
            "shared and writable paths must be relative without '..': {:?}",
            path
        )));
    }
    Ok(())
}

/// Deep-merge `overlay` into `base`. Tables merge key by key, everything
/// else (arrays included) is replaced.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match value {
            toml::Value::Table(incoming) => {
                if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                    merge_tables(existing, incoming);
                    continue;
                }
                base.insert(key, toml::Value::Table(incoming));
            }
            other => {
                base.insert(key, other);
            }
        }
    }
}
