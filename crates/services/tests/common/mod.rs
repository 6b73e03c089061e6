//! Fixtures shared by the model and annotation integration tests.

#![allow(dead_code)]

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use services::services::{config::ModelConfig, model::Model};
use tempfile::TempDir;
use vcs::{ClientConfig, ProcessClient};

/// Resolve the `git` binary, or `None` when the test should be skipped.
pub async fn git_client() -> Option<Arc<ProcessClient>> {
    utils::log::init_tracing("services=debug,vcs=debug");
    match ProcessClient::new(ClientConfig::default()).await {
        Ok(client) => Some(client),
        Err(err) => {
            eprintln!("Skipping test: {err}");
            None
        }
    }
}

/// Timers short enough for tests, watchers off unless asked for.
pub fn fast_config(watch_filesystem: bool) -> ModelConfig {
    ModelConfig {
        refresh_debounce_ms: 50,
        refresh_cooldown_ms: 0,
        annotation_invalidate_debounce_ms: 50,
        watch_filesystem,
        ..ModelConfig::default()
    }
}

/// A model over a fresh temporary directory
pub struct TestWorkspace {
    pub dir: TempDir,
    pub root: PathBuf,
    pub model: Model,
}

impl TestWorkspace {
    pub fn new(client: Arc<ProcessClient>, config: ModelConfig) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let root = dir.path().join("work");
        fs::create_dir_all(&root).unwrap();
        let model = Model::new(client, config, &root);
        Self { dir, root, model }
    }

    /// `init` through the model, then configure an identity for commits.
    pub async fn init(&self) {
        self.model.init().await.expect("init repository");
        configure_git_user(&self.root, "Test User", "test@example.com");
    }

    pub fn write_file(&self, rel_path: &str, content: &str) {
        write_file(&self.root, rel_path, content);
    }

    pub fn path(&self, rel_path: &str) -> PathBuf {
        self.root.join(rel_path)
    }

    pub fn commit_count(&self) -> usize {
        commit_count(&self.root)
    }

    pub fn head_oid(&self) -> String {
        let repo = git2::Repository::open(&self.root).unwrap();
        let oid = repo.head().unwrap().peel_to_commit().unwrap().id();
        oid.to_string()
    }
}

/// Write a file at the given path, creating parents
pub fn write_file<P: AsRef<Path>>(base: P, rel: &str, content: &str) {
    let path = base.as_ref().join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut f = fs::File::create(&path).unwrap();
    f.write_all(content.as_bytes()).unwrap();
}

pub fn configure_git_user(repo_path: &Path, name: &str, email: &str) {
    let repo = git2::Repository::open(repo_path).unwrap();
    let mut cfg = repo.config().unwrap();
    cfg.set_str("user.name", name).unwrap();
    cfg.set_str("user.email", email).unwrap();
}

/// Commits reachable from HEAD; zero on an unborn branch.
pub fn commit_count(repo_path: &Path) -> usize {
    let repo = git2::Repository::open(repo_path).unwrap();
    if repo.head().is_err() {
        return 0;
    }
    let mut walk = repo.revwalk().unwrap();
    walk.push_head().unwrap();
    walk.count()
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn eventually<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
