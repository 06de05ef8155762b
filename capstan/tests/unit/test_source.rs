//! Git source cache against a local upstream repository

use std::fs;
use std::path::Path;
use std::process::Command;

use capstan::errors::CapstanError;
use capstan::source::{GitCache, Source};

use crate::support;

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args([
            "-c",
            "user.name=Capstan Test",
            "-c",
            "user.email=test@example.com",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

/// Upstream repository on branch `main` with one commit
fn upstream(root: &Path) -> std::path::PathBuf {
    let repo = root.join("upstream");
    fs::create_dir_all(&repo).unwrap();
    git(&repo, &["init", "-q"]);
    git(&repo, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    support::write_app_tree(&repo);
    fs::create_dir_all(repo.join("public")).unwrap();
    fs::write(repo.join("public/app.js"), "console.log('v1');\n").unwrap();
    fs::write(repo.join(".gitignore"), "*.log\n").unwrap();
    git(&repo, &["add", "-A"]);
    git(&repo, &["commit", "-q", "-m", "initial"]);
    repo
}

fn commit_change(repo: &Path, content: &str) -> String {
    fs::write(repo.join("public/app.js"), content).unwrap();
    git(repo, &["commit", "-q", "-am", "change"]);
    git(repo, &["rev-parse", "HEAD"])
}

#[tokio::test]
async fn test_first_sync_clones_and_pins_revision() {
    if !git_available() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let repo = upstream(tmp.path());
    let cache_path = tmp.path().join("cache");
    let cache = GitCache::new(repo.display().to_string(), "main", &cache_path, support::sink());

    let rev = cache.sync().await.unwrap();
    assert_eq!(rev.as_str(), git(&repo, &["rev-parse", "HEAD"]));
    assert!(cache_path.join("web/index.php").exists());
    assert!(git(&cache_path, &["branch", "--list", "deploy"]).ends_with("deploy"));
}

#[tokio::test]
async fn test_sync_is_idempotent() {
    if !git_available() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let repo = upstream(tmp.path());
    let cache_path = tmp.path().join("cache");
    let cache = GitCache::new(repo.display().to_string(), "main", &cache_path, support::sink());

    let first = cache.sync().await.unwrap();
    let first_hash = support::hash_tree(&cache_path);

    // Local debris is cleaned away by the next sync.
    fs::write(cache_path.join("public/stray.txt"), "untracked").unwrap();
    fs::write(cache_path.join("public/app.js"), "tampered").unwrap();

    let second = cache.sync().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(support::hash_tree(&cache_path), first_hash);
}

#[tokio::test]
async fn test_sync_follows_new_commits() {
    if !git_available() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let repo = upstream(tmp.path());
    let cache_path = tmp.path().join("cache");
    let cache = GitCache::new(repo.display().to_string(), "main", &cache_path, support::sink());

    let first = cache.sync().await.unwrap();
    let head = commit_change(&repo, "console.log('v2');\n");
    let second = cache.sync().await.unwrap();

    assert_ne!(first, second);
    assert_eq!(second.as_str(), head);
    assert_eq!(
        fs::read_to_string(cache_path.join("public/app.js")).unwrap(),
        "console.log('v2');\n"
    );
}

#[tokio::test]
async fn test_unknown_branch_is_sync_error() {
    if !git_available() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let repo = upstream(tmp.path());
    let cache = GitCache::new(
        repo.display().to_string(),
        "no-such-branch",
        tmp.path().join("cache"),
        support::sink(),
    );

    assert!(matches!(
        cache.sync().await,
        Err(CapstanError::SyncError(_))
    ));
}

#[tokio::test]
async fn test_snapshot_copies_subdir() {
    if !git_available() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let repo = upstream(tmp.path());
    let cache = GitCache::new(
        repo.display().to_string(),
        "main",
        tmp.path().join("cache"),
        support::sink(),
    )
    .with_subdir("public");
    cache.sync().await.unwrap();

    let snapshot = cache.snapshot().await.unwrap();
    assert!(snapshot.path().join("app.js").is_file());
    assert!(!snapshot.path().join("web").exists());

    snapshot.remove().await;
    assert!(!snapshot.exists().await);
}

#[tokio::test]
async fn test_snapshot_of_missing_source_fails_cleanly() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = GitCache::new(
        "unused",
        "main",
        tmp.path().join("never-cloned"),
        support::sink(),
    );

    let err = cache.snapshot().await.unwrap_err();
    assert!(matches!(err, CapstanError::SyncError(_)));
}

#[tokio::test]
async fn test_ensure_cloned_clones_missing_cache() {
    if !git_available() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let repo = upstream(tmp.path());
    let cache_path = tmp.path().join("cache");
    let cache = GitCache::new(repo.display().to_string(), "main", &cache_path, support::sink());

    assert!(!cache.is_cloned().await);
    cache.ensure_cloned().await.unwrap();
    assert!(cache.is_cloned().await);
    assert!(cache_path.join("web/index.php").is_file());
    assert_eq!(
        git(&cache_path, &["rev-parse", "HEAD"]),
        git(&repo, &["rev-parse", "HEAD"])
    );

    // A second call finds the cache and leaves it alone.
    let marker = cache_path.join("local-only.txt");
    fs::write(&marker, "kept").unwrap();
    cache.ensure_cloned().await.unwrap();
    assert_eq!(fs::read_to_string(&marker).unwrap(), "kept");
}

#[tokio::test]
async fn test_ensure_cloned_skips_existing_cache() {
    let tmp = tempfile::tempdir().unwrap();
    let cache_path = tmp.path().join("cache");
    fs::create_dir_all(&cache_path).unwrap();
    let sink = support::sink();
    let cache = GitCache::new("/nonexistent/repo", "main", &cache_path, sink.clone());

    cache.ensure_cloned().await.unwrap();
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn test_ensure_cloned_reports_clone_failure() {
    if !git_available() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let cache = GitCache::new(
        tmp.path().join("missing-upstream").display().to_string(),
        "main",
        tmp.path().join("cache"),
        support::sink(),
    );

    assert!(matches!(
        cache.ensure_cloned().await,
        Err(CapstanError::SyncError(_))
    ));
    assert!(!cache.is_cloned().await);
}
