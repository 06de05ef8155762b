//! Configuration loading

use std::fs;
use std::path::{Path, PathBuf};

use capstan::errors::CapstanError;
use capstan::logs::LogLevel;
use capstan::storage::settings::Config;

fn write_config(root: &Path, base: &str, stages: &[(&str, &str)]) -> PathBuf {
    let stage_dir = root.join("config/deploy");
    fs::create_dir_all(&stage_dir).unwrap();
    let base_path = root.join("config/deploy.toml");
    fs::write(
        &base_path,
        format!("stage_dir = {:?}\n{}", stage_dir.display().to_string(), base),
    )
    .unwrap();
    for (name, content) in stages {
        fs::write(stage_dir.join(format!("{}.toml", name)), content).unwrap();
    }
    base_path
}

const BASE: &str = r#"
name = "shop"
git_repo_url = "git@example.com:shop.git"
deploy_to = "/var/www/shop"
ssh_user = "deploy"
web_user = "www-data"
shared_dirs = ["app/logs", "web/uploads"]
shared_files = ["app/config/parameters.yml"]
deploy_keep_releases = 3
log_level = "warn"
"#;

#[tokio::test]
async fn test_stage_overrides_base() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_config(
        tmp.path(),
        BASE,
        &[(
            "staging",
            r#"
git_branch = "develop"
shared_dirs = ["app/logs"]

[[servers]]
host = "stage1.example.com"
port = 2222
roles = ["web"]

[[servers]]
host = "stage2.example.com"
user = "admin"
deploy_to = "/srv/shop"
"#,
        )],
    );

    let config = Config::load(&path, Some("staging")).await.unwrap();
    assert_eq!(config.git_branch, "develop");
    assert_eq!(config.shared_dirs, vec!["app/logs"]);
    assert_eq!(config.deploy_keep_releases, 3);
    assert_eq!(config.log_level, LogLevel::Warn);

    let first = &config.servers[0];
    assert_eq!(first.port, 2222);
    assert_eq!(first.user, "deploy");
    assert_eq!(first.web_user, "www-data");
    assert!(first.has_role("web"));

    let second = &config.servers[1];
    assert_eq!(second.port, 22);
    assert_eq!(second.user, "admin");
    assert_eq!(second.deploy_to, Some(PathBuf::from("/srv/shop")));
    assert!(config.validate().is_ok());
}

#[tokio::test]
async fn test_default_stage_is_used() {
    let tmp = tempfile::tempdir().unwrap();
    let base = format!("{}\nstage_default = \"live\"\n", BASE);
    let path = write_config(
        tmp.path(),
        &base,
        &[("live", "[[servers]]\nhost = \"web1\"\n")],
    );

    let config = Config::load(&path, None).await.unwrap();
    assert_eq!(config.servers.len(), 1);
    assert_eq!(config.servers[0].host, "web1");
}

#[tokio::test]
async fn test_missing_files_are_config_errors() {
    let tmp = tempfile::tempdir().unwrap();
    let missing = tmp.path().join("nope.toml");
    assert!(matches!(
        Config::load(&missing, None).await,
        Err(CapstanError::ConfigError(_))
    ));

    let path = write_config(tmp.path(), BASE, &[]);
    let err = Config::load(&path, Some("prod")).await.unwrap_err();
    assert!(err.to_string().contains("prod"));
}

#[test]
fn test_invalid_toml_is_config_error() {
    assert!(matches!(
        Config::from_sources("deploy_to = ", None),
        Err(CapstanError::ConfigError(_))
    ));
}

#[test]
fn test_validation() {
    let servers = "[[servers]]\nhost = \"web1\"\n";
    let ok = Config::from_sources(BASE, Some(servers)).unwrap();
    assert!(ok.validate().is_ok());

    let no_servers = Config::from_sources(BASE, None).unwrap();
    assert!(no_servers.validate().is_err());

    let mut keep_none = ok.clone();
    keep_none.deploy_keep_releases = 0;
    assert!(keep_none.validate().is_err());

    let mut escaping = ok.clone();
    escaping.shared_files = vec!["../../etc/passwd".into()];
    assert!(escaping.validate().is_err());

    let mut whole_release = ok.clone();
    whole_release.shared_dirs = vec![".".into()];
    assert!(matches!(
        whole_release.validate(),
        Err(CapstanError::ConfigError(_))
    ));

    let mut no_root = ok;
    no_root.deploy_to = PathBuf::new();
    assert!(no_root.validate().is_err());
}

#[test]
fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.git_branch, "master");
    assert_eq!(config.deploy_keep_releases, 5);
    assert_eq!(config.stage_default, "prod");
    assert_eq!(config.ssh_port, 22);
}
