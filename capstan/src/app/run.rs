//! Wiring configuration into a deployer

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::app::options::{AppOptions, Command};
use crate::app::state::DeployContext;
use crate::deploy::{Deployer, DeploymentReport, RsyncDistributor};
use crate::errors::CapstanError;
use crate::filesys::file::File;
use crate::hooks::hook_for;
use crate::logs::LogSink;
use crate::remote::SshConnector;
use crate::source::GitCache;
use crate::storage::settings::Config;

const BASE_TEMPLATE: &str = r#"# capstan base configuration
name = "app"

git_repo_url = "git@github.com:example/app.git"
git_branch = "master"
git_submodules = false

deploy_to = "/var/www/app"
deploy_keep_releases = 5
deploy_cached_copy = "tmp/cached-copy"
deploy_subdir = ""
deploy_exclude = []

shared_dirs = ["app/logs"]
shared_files = ["app/config/parameters.yml"]
writable_dirs = ["app/cache", "app/logs"]

stage_dir = "{stage_dir}"
stage_default = "prod"

# framework = "symfony"
symfony_env = "prod"
env = []

ssh_user = "deploy"
ssh_port = 22
web_user = "www-data"
"#;

const STAGE_TEMPLATE: &str = r#"# prod stage: overrides the base configuration

[[servers]]
host = "web1.example.com"
roles = ["web", "app"]
"#;

fn base_template(stage_dir: &Path) -> String {
    BASE_TEMPLATE.replace("{stage_dir}", &stage_dir.display().to_string())
}

/// Load and validate the configuration named by `options`
pub async fn load_context(options: &AppOptions) -> Result<Arc<DeployContext>, CapstanError> {
    let config = Config::load(&options.config_path, options.stage.as_deref()).await?;
    Ok(Arc::new(DeployContext::new(config)?))
}

/// Deployer backed by git, rsync and SSH
pub fn build_deployer(
    ctx: Arc<DeployContext>,
    sink: Arc<dyn LogSink>,
) -> Result<Deployer, CapstanError> {
    let config = &ctx.config;
    let hook = hook_for(config)?;
    let source = Arc::new(GitCache::from_config(config, sink.clone()));
    let connector = Arc::new(SshConnector::new(sink.clone(), config.ssh_forward_agent));
    let distributor = Arc::new(RsyncDistributor::new(sink.clone(), ctx.local_host.clone()));

    Ok(Deployer::new(
        ctx.clone(),
        source,
        connector,
        distributor,
        hook,
        sink,
    ))
}

/// Run `deploy` or `setup` against a loaded context
pub async fn run(
    command: Command,
    ctx: Arc<DeployContext>,
    sink: Arc<dyn LogSink>,
) -> Result<DeploymentReport, CapstanError> {
    let deployer = build_deployer(ctx, sink)?;
    match command {
        Command::Deploy => deployer.deploy().await,
        Command::Setup => deployer.setup().await,
        Command::Init => Err(CapstanError::Internal(
            "init does not need a deploy context".to_string(),
        )),
    }
}

/// Write template configuration files next to `config_path`.
///
/// Existing files are never overwritten. Returns the files written.
pub async fn init(config_path: &Path) -> Result<Vec<PathBuf>, CapstanError> {
    let stage_dir = config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("deploy");
    let targets = [
        (config_path.to_path_buf(), base_template(&stage_dir)),
        (stage_dir.join("prod.toml"), STAGE_TEMPLATE.to_string()),
    ];

    let mut written = Vec::new();
    for (path, template) in targets {
        if File::new(&path).write_new(&template).await? {
            info!("Wrote {}", path.display());
            written.push(path);
        } else {
            info!("Keeping existing {}", path.display());
        }
    }
    Ok(written)
}
