//! Sessions and the connector

use std::sync::Arc;

use capstan::errors::CapstanError;
use capstan::remote::{Connector, SshConnector};
use capstan::storage::settings::Server;

use crate::support;

#[tokio::test]
async fn test_session_is_sticky() {
    let tmp = tempfile::tempdir().unwrap();
    let sink = support::sink();
    let mut session = support::local_session("web1", sink.clone());
    let marker = tmp.path().join("marker");

    assert_eq!(session.run("echo hello").await, "hello");
    session.run("ls /nonexistent/capstan/path").await;
    session
        .run(&format!("touch {}", marker.display()))
        .await;

    assert!(!marker.exists());
    assert!(matches!(session.err(), Some(CapstanError::ExecutionError(_))));
    assert_eq!(sink.commands_for("web1").len(), 2);
}

#[tokio::test]
async fn test_exists() {
    let tmp = tempfile::tempdir().unwrap();
    let mut session = support::local_session("web1", support::sink());

    assert!(session.exists(tmp.path()).await);
    assert!(!session.exists(&tmp.path().join("missing dir")).await);
    assert!(session.is_ok());

    session.fail(CapstanError::StageError("earlier failure".into()));
    assert!(!session.exists(tmp.path()).await);
}

#[tokio::test]
async fn test_fail_keeps_first_error() {
    let mut session = support::local_session("web1", support::sink());
    session.fail(CapstanError::StageError("first".into()));
    session.fail(CapstanError::StageError("second".into()));
    assert_eq!(session.finish().unwrap_err().message(), "first");
    assert!(session.finish().is_ok());
}

#[tokio::test]
async fn test_exec_quotes_arguments() {
    let tmp = tempfile::tempdir().unwrap();
    let mut session = support::local_session("web1", support::sink());
    let path = tmp.path().join("with space");

    session.exec("mkdir", &["-p", path.to_str().unwrap()]).await;
    assert!(session.is_ok());
    assert!(path.is_dir());
}

#[tokio::test]
async fn test_connector_uses_local_execution_for_localhost() {
    let sink = support::sink();
    let connector = SshConnector::new(sink.clone(), false);

    let mut session = connector.connect(&Server::new("localhost")).await.unwrap();
    assert_eq!(session.host(), "localhost");
    assert_eq!(session.run("echo ok").await, "ok");
    session.close().await.unwrap();

    assert_eq!(sink.commands_for("localhost"), vec!["echo ok"]);
}

#[tokio::test]
async fn test_connector_rejects_missing_identity_file() {
    let connector = SshConnector::new(Arc::new(capstan::logs::MemorySink::new()), false);
    let mut server = Server::new("web1.invalid");
    server.identity_file = Some("~/.ssh/capstan-test-missing-key".into());

    let result = connector.connect(&server).await;
    assert!(matches!(result, Err(CapstanError::ConnectError(_))));
}
