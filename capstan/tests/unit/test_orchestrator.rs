//! End-to-end deploys across two local hosts

use std::fs;
use std::path::Path;
use std::sync::Arc;

use capstan::deploy::{Deployer, RsyncDistributor};
use capstan::errors::CapstanError;
use capstan::hooks::{AppHook, NoopHook};
use capstan::logs::{LogEvent, MemorySink, StepStatus};
use capstan::release::ReleaseState;
use capstan::remote::SshConnector;
use capstan::source::Source;
use capstan::storage::layout::ReleaseLayout;
use capstan::storage::settings::Config;

use crate::support::{
    self, current_target, release_names, FailOnHosts, NoopDistributor, ScriptedConnector,
    ScriptedTransport, StaticSource,
};

const HOST_A: &str = "localhost";
const HOST_B: &str = "127.0.0.1";

fn deployer(
    config: Config,
    source: Arc<dyn Source>,
    hook: Arc<dyn AppHook>,
    sink: Arc<MemorySink>,
) -> Deployer {
    let ctx = support::context(config);
    Deployer::new(
        ctx.clone(),
        source,
        Arc::new(SshConnector::new(sink.clone(), false)),
        Arc::new(RsyncDistributor::new(sink.clone(), ctx.local_host.clone())),
        hook,
        sink,
    )
}

fn app_source(root: &Path) -> Arc<StaticSource> {
    let src = root.join("src");
    support::write_app_tree(&src);
    Arc::new(StaticSource::new(&src))
}

#[tokio::test]
async fn test_deploy_rotates_releases() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("host-a");
    let layout = ReleaseLayout::new(&root);
    fs::create_dir_all(layout.shared_dir()).unwrap();
    support::seed_releases(
        &layout,
        &["20240101000000", "20240102000000", "20240103000000"],
    );

    let mut config = support::config(&[(HOST_A, root.as_path())]);
    config.deploy_keep_releases = 2;
    let source = app_source(tmp.path());
    let deployer = deployer(config, source.clone(), Arc::new(NoopHook), support::sink());

    let report = deployer.deploy_at("20240104000000").await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.timestamp.as_deref(), Some("20240104000000"));
    assert_eq!(
        report.revision.as_ref().map(|r| r.as_str()),
        Some(support::REVISION)
    );
    assert_eq!(
        release_names(&layout),
        vec!["20240103000000", "20240104000000"]
    );
    assert_eq!(
        current_target(&layout),
        Some(layout.release_dir("20240104000000"))
    );
    assert!(layout.cached_copy().join("web/index.php").exists());

    let snapshots = source.snapshot_paths();
    assert_eq!(snapshots.len(), 1);
    assert!(!snapshots[0].exists());
}

#[tokio::test]
async fn test_failed_host_is_rolled_back_without_affecting_others() {
    let tmp = tempfile::tempdir().unwrap();
    let root_a = tmp.path().join("host-a");
    let root_b = tmp.path().join("host-b");
    let layout_a = ReleaseLayout::new(&root_a);
    let layout_b = ReleaseLayout::new(&root_b);
    for layout in [&layout_a, &layout_b] {
        fs::create_dir_all(layout.shared_dir()).unwrap();
    }
    support::seed_releases(&layout_b, &["20240103000000"]);

    let config = support::config(&[(HOST_A, root_a.as_path()), (HOST_B, root_b.as_path())]);
    let sink = support::sink();
    let deployer = deployer(
        config,
        app_source(tmp.path()),
        Arc::new(FailOnHosts(vec![HOST_B.to_string()])),
        sink.clone(),
    );

    let report = deployer.deploy_at("20240104000000").await.unwrap();
    assert!(!report.is_success());
    assert_eq!(report.hosts.len(), 2);
    assert_eq!(report.hosts[0].host, HOST_A);
    assert_eq!(report.failed_hosts(), vec![HOST_B]);

    let a = report.host(HOST_A).unwrap();
    assert_eq!(a.state, Some(ReleaseState::Activated));
    assert_eq!(
        current_target(&layout_a),
        Some(layout_a.release_dir("20240104000000"))
    );
    assert!(layout_a.release_dir("20240104000000").join("hooked").exists());

    let b = report.host(HOST_B).unwrap();
    assert_eq!(b.state, Some(ReleaseState::RolledBack));
    assert!(b.error.as_deref().unwrap_or("").contains("composer install failed"));
    assert!(b.rollback_error.is_none());
    assert!(!layout_b.release_dir("20240104000000").exists());
    assert_eq!(
        current_target(&layout_b),
        Some(layout_b.release_dir("20240103000000"))
    );

    let rollback_ok = sink.events().into_iter().any(|e| {
        e == LogEvent::Step {
            host: HOST_B.to_string(),
            step: "Rollback".to_string(),
            status: StepStatus::Ok,
        }
    });
    assert!(rollback_ok);
}

#[tokio::test]
async fn test_sync_failure_aborts_before_any_host_work() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("host-a");
    let config = support::config(&[(HOST_A, root.as_path())]);
    let sink = support::sink();
    let deployer = deployer(
        config,
        Arc::new(support::BrokenSource),
        Arc::new(NoopHook),
        sink.clone(),
    );

    let err = deployer.deploy_at("20240104000000").await.unwrap_err();
    assert!(matches!(err, CapstanError::SyncError(_)));
    assert!(!root.exists());
    assert!(sink.commands_for(HOST_A).is_empty());
}

#[tokio::test]
async fn test_invalid_timestamp_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("host-a");
    let config = support::config(&[(HOST_A, root.as_path())]);
    let deployer = deployer(
        config,
        app_source(tmp.path()),
        Arc::new(NoopHook),
        support::sink(),
    );

    assert!(matches!(
        deployer.deploy_at("2024-01-04").await,
        Err(CapstanError::ConfigError(_))
    ));
}

#[tokio::test]
async fn test_setup_creates_deploy_roots() {
    let tmp = tempfile::tempdir().unwrap();
    let root_a = tmp.path().join("host-a");
    let root_b = tmp.path().join("nested/host-b");
    let config = support::config(&[(HOST_A, root_a.as_path()), (HOST_B, root_b.as_path())]);
    let deployer = deployer(
        config,
        app_source(tmp.path()),
        Arc::new(NoopHook),
        support::sink(),
    );

    let report = deployer.setup().await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.command, "setup");
    for root in [&root_a, &root_b] {
        let layout = ReleaseLayout::new(root);
        assert!(layout.releases_dir().is_dir());
        assert!(layout.shared_dir().is_dir());
    }
}

#[tokio::test]
async fn test_report_serializes_to_json() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("host-a");
    fs::create_dir_all(ReleaseLayout::new(&root).shared_dir()).unwrap();
    let config = support::config(&[(HOST_A, root.as_path())]);
    let deployer = deployer(
        config,
        app_source(tmp.path()),
        Arc::new(NoopHook),
        support::sink(),
    );

    let report = deployer.deploy_at("20240104000000").await.unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["command"], "deploy");
    assert_eq!(json["hosts"][0]["state"], "activated");
    assert_eq!(json["hosts"][0]["success"], true);
}

#[tokio::test]
async fn test_failed_activation_removes_staged_release() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("host-a");
    let layout = ReleaseLayout::new(&root);
    fs::create_dir_all(layout.shared_dir()).unwrap();
    support::seed_releases(&layout, &["20240103000000"]);
    fs::remove_file(layout.current_link()).unwrap();
    fs::create_dir_all(layout.current_link().join("maintenance")).unwrap();

    let config = support::config(&[(HOST_A, root.as_path())]);
    let deployer = deployer(
        config,
        app_source(tmp.path()),
        Arc::new(NoopHook),
        support::sink(),
    );

    let report = deployer.deploy_at("20240104000000").await.unwrap();
    let a = report.host(HOST_A).unwrap();
    assert!(!a.success);
    assert!(a.error.as_deref().unwrap_or("").starts_with("Activation error"));
    assert_eq!(a.state, Some(ReleaseState::RolledBack));
    assert!(a.rollback_error.is_none());

    assert_eq!(release_names(&layout), vec!["20240103000000"]);
    assert!(layout.current_link().join("maintenance").is_dir());
    assert!(fs::symlink_metadata(root.join("current.20240104000000")).is_err());
}

#[tokio::test]
async fn test_rollback_failure_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let config = support::config(&[("web1", Path::new("/srv/shop"))]);
    let sink = support::sink();
    let transport = ScriptedTransport::new("web1")
        .fail("composer install failed", "composer install failed")
        .fail(
            "rm -Rf /srv/shop/releases/20240104000000",
            "rm: cannot remove '/srv/shop/releases/20240104000000': Permission denied",
        );

    let deployer = Deployer::new(
        support::context(config),
        app_source(tmp.path()),
        Arc::new(ScriptedConnector {
            transport,
            sink: sink.clone(),
        }),
        Arc::new(NoopDistributor),
        Arc::new(FailOnHosts(vec!["web1".to_string()])),
        sink.clone(),
    );

    let report = deployer.deploy_at("20240104000000").await.unwrap();
    let host = report.host("web1").unwrap();
    assert!(!host.success);
    assert!(host
        .error
        .as_deref()
        .unwrap_or("")
        .contains("composer install failed"));
    assert!(host
        .rollback_error
        .as_deref()
        .unwrap_or("")
        .contains("Permission denied"));
    assert_eq!(host.state, Some(ReleaseState::Failed));

    let rollback_failed = sink.events().into_iter().any(|e| {
        e == LogEvent::Step {
            host: "web1".to_string(),
            step: "Rollback".to_string(),
            status: StepStatus::Failed,
        }
    });
    assert!(rollback_failed);
    assert!(!sink
        .commands_for("web1")
        .iter()
        .any(|c| c.starts_with("mv -Tf")));
}
