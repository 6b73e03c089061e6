//! Repository model: owns the repository handle, tracks running operations
//! and publishes resource-group snapshots to observers.

use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::{Arc, Weak},
};

use thiserror::Error;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tracing::{debug, info, trace, warn};
use vcs::{
    Branch, CommitOptions, OperationKind, OperationsInProgress, ProcessClient, Ref, Repository,
    RepositoryState, ResourceGroups, ResourceStatus, VcsError,
};

use super::{
    config::ModelConfig,
    debounce::Debouncer,
    lock::when_file_absent,
    watcher::{self, FsEvent, FsWatcher, WatchSource, is_relevant_change},
};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Vcs(#[from] VcsError),
    #[error("no repository found at {0}")]
    NotARepository(PathBuf),
}

impl ModelError {
    pub fn is_not_a_repository(&self) -> bool {
        match self {
            ModelError::NotARepository(_) => true,
            ModelError::Vcs(err) => err.is_not_a_repository(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    OperationStarted(OperationKind),
    OperationCompleted(OperationKind),
    StateChanged(RepositoryState),
    /// A new snapshot was published
    ResourcesChanged,
}

/// Everything a status refresh produces, replaced wholesale.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepositorySnapshot {
    pub groups: ResourceGroups,
    pub head: Option<Branch>,
    pub refs: Vec<Ref>,
}

struct RepositorySlot {
    state: RepositoryState,
    repository: Option<Arc<Repository>>,
    watchers: Vec<FsWatcher>,
}

struct ModelInner {
    config: ModelConfig,
    client: Arc<ProcessClient>,
    workspace_root: PathBuf,
    slot: Mutex<RepositorySlot>,
    state: watch::Sender<RepositoryState>,
    operations: watch::Sender<OperationsInProgress>,
    snapshot: watch::Sender<Arc<RepositorySnapshot>>,
    events: broadcast::Sender<ModelEvent>,
    /// Held by every mutating operation
    mutation: Mutex<()>,
    fs_tx: mpsc::UnboundedSender<FsEvent>,
    refresh: Debouncer,
}

impl ModelInner {
    fn emit(&self, event: ModelEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Clears the running flag and reports completion even if the caller drops
/// the operation future.
struct OperationGuard<'a> {
    inner: &'a ModelInner,
    kind: OperationKind,
}

impl<'a> OperationGuard<'a> {
    fn start(inner: &'a ModelInner, kind: OperationKind) -> Self {
        inner.operations.send_modify(|ops| *ops = ops.start(kind));
        inner.emit(ModelEvent::OperationStarted(kind));
        trace!(operation = %kind, "operation started");
        Self { inner, kind }
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        let kind = self.kind;
        self.inner.operations.send_modify(|ops| *ops = ops.end(kind));
        self.inner.emit(ModelEvent::OperationCompleted(kind));
        trace!(operation = %kind, "operation completed");
    }
}

#[derive(Clone)]
pub struct Model {
    inner: Arc<ModelInner>,
}

impl Model {
    /// Create a model for `workspace_root`. Must be called inside a tokio
    /// runtime; nothing touches the repository until the first operation.
    pub fn new(
        client: Arc<ProcessClient>,
        config: ModelConfig,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        let workspace_root = workspace_root.into();
        let (fs_tx, fs_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(64);

        let inner = Arc::new_cyclic(|weak: &Weak<ModelInner>| {
            let weak = weak.clone();
            let refresh = Debouncer::spawn(
                config.refresh_debounce(),
                config.refresh_cooldown(),
                move || {
                    let weak = weak.clone();
                    async move {
                        if let Some(inner) = weak.upgrade() {
                            Model { inner }.refresh().await;
                        }
                    }
                },
            );

            ModelInner {
                config,
                client,
                workspace_root,
                slot: Mutex::new(RepositorySlot {
                    state: RepositoryState::Uninitialized,
                    repository: None,
                    watchers: Vec::new(),
                }),
                state: watch::Sender::new(RepositoryState::Uninitialized),
                operations: watch::Sender::new(OperationsInProgress::new()),
                snapshot: watch::Sender::new(Arc::new(RepositorySnapshot::default())),
                events,
                mutation: Mutex::new(()),
                fs_tx,
                refresh,
            }
        });

        tokio::spawn(Self::consume_fs_events(Arc::downgrade(&inner), fs_rx));
        Self { inner }
    }

    /// Resolve the executable from `config` and create the model.
    pub async fn open(
        config: ModelConfig,
        workspace_root: impl Into<PathBuf>,
    ) -> Result<Self, ModelError> {
        let client = ProcessClient::new(config.client_config()).await?;
        Ok(Self::new(client, config, workspace_root))
    }

    async fn consume_fs_events(
        weak: Weak<ModelInner>,
        mut rx: mpsc::UnboundedReceiver<FsEvent>,
    ) {
        while let Some(event) = rx.recv().await {
            let Some(inner) = weak.upgrade() else {
                break;
            };
            Model { inner }.handle_fs_event(event).await;
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.inner.config
    }

    pub fn workspace_root(&self) -> &Path {
        &self.inner.workspace_root
    }

    pub fn state(&self) -> RepositoryState {
        *self.inner.state.borrow()
    }

    pub fn operations(&self) -> OperationsInProgress {
        self.inner.operations.borrow().clone()
    }

    pub fn snapshot(&self) -> Arc<RepositorySnapshot> {
        self.inner.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ModelEvent> {
        self.inner.events.subscribe()
    }

    pub fn watch_state(&self) -> watch::Receiver<RepositoryState> {
        self.inner.state.subscribe()
    }

    pub fn watch_operations(&self) -> watch::Receiver<OperationsInProgress> {
        self.inner.operations.subscribe()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<Arc<RepositorySnapshot>> {
        self.inner.snapshot.subscribe()
    }

    /// The current repository handle, if the root has been resolved.
    pub async fn repository(&self) -> Option<Arc<Repository>> {
        self.inner.slot.lock().await.repository.clone()
    }

    /// Wait until no operation is running.
    pub async fn when_idle(&self) {
        let mut rx = self.inner.operations.subscribe();
        // The sender lives as long as `self`
        let _ = rx.wait_for(|ops| ops.is_idle()).await;
    }

    /// Run `action` against the repository as operation `kind`.
    ///
    /// Mutating operations hold the mutation permit, wait for the lock marker
    /// to clear and refresh the snapshot afterwards. The running flag is
    /// cleared and completion emitted in every outcome.
    pub async fn run<T, F, Fut>(&self, kind: OperationKind, action: F) -> Result<T, ModelError>
    where
        F: FnOnce(Arc<Repository>) -> Fut,
        Fut: Future<Output = Result<T, VcsError>>,
    {
        let _guard = OperationGuard::start(&self.inner, kind);
        let result = self.execute(kind, action).await;
        if let Err(err) = &result {
            if err.is_not_a_repository() {
                self.mark_not_a_repository().await;
            } else {
                debug!(operation = %kind, "operation failed: {err}");
            }
        }
        result
    }

    async fn execute<T, F, Fut>(&self, kind: OperationKind, action: F) -> Result<T, ModelError>
    where
        F: FnOnce(Arc<Repository>) -> Fut,
        Fut: Future<Output = Result<T, VcsError>>,
    {
        let _permit = if kind.is_read_only() {
            None
        } else {
            Some(self.inner.mutation.lock().await)
        };

        let repository = if kind == OperationKind::Init {
            Arc::new(self.inner.client.open(self.inner.workspace_root.clone()))
        } else {
            self.ensure_repository().await?
        };

        let config = &self.inner.config;
        let marker = repository
            .root()
            .join(&config.metadata_dir)
            .join(&config.lock_file);
        when_file_absent(&config.lock_backoff, &marker).await;

        let value = action(repository).await?;

        if !kind.is_read_only() {
            let repository = self.ensure_repository().await?;
            self.update_model(&repository).await?;
        }
        Ok(value)
    }

    async fn ensure_repository(&self) -> Result<Arc<Repository>, ModelError> {
        let mut slot = self.inner.slot.lock().await;
        if slot.state == RepositoryState::Idle {
            if let Some(repository) = &slot.repository {
                return Ok(repository.clone());
            }
        }

        slot.watchers.clear();
        slot.repository = None;

        let workspace_root = &self.inner.workspace_root;
        match self.inner.client.get_repository_root(workspace_root).await {
            Ok(root) => {
                let repository = Arc::new(self.inner.client.open(root));
                slot.watchers = self.watch_repository(repository.root());
                slot.repository = Some(repository.clone());
                self.set_state(&mut slot, RepositoryState::Idle);
                info!(root = %repository.root().display(), "repository opened");
                Ok(repository)
            }
            Err(err) => {
                slot.watchers = self.watch_root_probe();
                self.set_state(&mut slot, RepositoryState::NotARepository);
                if err.is_not_a_repository() {
                    Err(ModelError::NotARepository(workspace_root.clone()))
                } else {
                    Err(err.into())
                }
            }
        }
    }

    async fn mark_not_a_repository(&self) {
        let mut slot = self.inner.slot.lock().await;
        if slot.state == RepositoryState::NotARepository {
            return;
        }
        slot.repository = None;
        slot.watchers = self.watch_root_probe();
        self.set_state(&mut slot, RepositoryState::NotARepository);
    }

    fn set_state(&self, slot: &mut RepositorySlot, state: RepositoryState) {
        if slot.state == state {
            return;
        }
        debug!(from = ?slot.state, to = ?state, "repository state changed");
        slot.state = state;
        self.inner.state.send_replace(state);
        self.inner.emit(ModelEvent::StateChanged(state));

        if state == RepositoryState::NotARepository {
            self.inner
                .snapshot
                .send_replace(Arc::new(RepositorySnapshot::default()));
            self.inner.emit(ModelEvent::ResourcesChanged);
        }
    }

    fn watch_repository(&self, root: &Path) -> Vec<FsWatcher> {
        if !self.inner.config.watch_filesystem {
            return Vec::new();
        }
        let metadata = root.join(&self.inner.config.metadata_dir);
        [
            (metadata.as_path(), WatchSource::Metadata),
            (self.inner.workspace_root.as_path(), WatchSource::Workspace),
        ]
        .into_iter()
        .filter_map(|(path, source)| self.install_watcher(path, true, source))
        .collect()
    }

    fn watch_root_probe(&self) -> Vec<FsWatcher> {
        if !self.inner.config.watch_filesystem {
            return Vec::new();
        }
        self.install_watcher(&self.inner.workspace_root, false, WatchSource::RootProbe)
            .into_iter()
            .collect()
    }

    fn install_watcher(
        &self,
        path: &Path,
        recursive: bool,
        source: WatchSource,
    ) -> Option<FsWatcher> {
        match watcher::watch(path, recursive, source, self.inner.fs_tx.clone()) {
            Ok(watcher) => Some(watcher),
            Err(err) => {
                warn!(?source, path = %path.display(), "failed to install watcher: {err}");
                None
            }
        }
    }

    async fn update_model(&self, repository: &Repository) -> Result<(), ModelError> {
        let entries = repository.status().await?;
        let groups = vcs::classify(repository.root(), &entries);

        let head = match repository.get_head().await {
            Ok(head) => Some(head),
            Err(err) => {
                debug!("no HEAD: {err}");
                None
            }
        };
        let refs = repository.get_refs().await.unwrap_or_else(|err| {
            warn!("failed to list refs: {err}");
            Vec::new()
        });

        trace!(
            merge = groups.merge.len(),
            index = groups.index.len(),
            working_tree = groups.working_tree.len(),
            "snapshot updated"
        );
        self.inner
            .snapshot
            .send_replace(Arc::new(RepositorySnapshot { groups, head, refs }));
        self.inner.emit(ModelEvent::ResourcesChanged);
        Ok(())
    }

    /// Route one filesystem event. Changes seen while an operation runs are
    /// dropped; its own refresh covers them.
    pub async fn handle_fs_event(&self, event: FsEvent) {
        let config = &self.inner.config;
        if !is_relevant_change(event.source, &event.path, &config.metadata_dir, &config.lock_file)
        {
            return;
        }

        if event.source == WatchSource::RootProbe {
            let mut slot = self.inner.slot.lock().await;
            if slot.state != RepositoryState::NotARepository {
                return;
            }
            info!(path = %event.path.display(), "metadata directory appeared");
            slot.watchers.clear();
            self.set_state(&mut slot, RepositoryState::Uninitialized);
            drop(slot);
            self.inner.refresh.trigger();
            return;
        }

        let idle = self.inner.operations.borrow().is_idle();
        if self.state() == RepositoryState::Idle && idle {
            trace!(path = %event.path.display(), "scheduling refresh");
            self.inner.refresh.trigger();
        } else {
            trace!(path = %event.path.display(), "busy, dropping change");
        }
    }

    async fn refresh(&self) {
        self.when_idle().await;
        if let Err(err) = self.status().await {
            warn!("background refresh failed: {err}");
        }
    }

    pub async fn init(&self) -> Result<(), ModelError> {
        self.run(OperationKind::Init, |repository| async move {
            repository.client().init(repository.root()).await
        })
        .await
    }

    /// Re-run status and publish a fresh snapshot.
    pub async fn status(&self) -> Result<(), ModelError> {
        self.run(OperationKind::Status, |_| async { Ok(()) }).await
    }

    pub async fn add(&self, paths: Vec<PathBuf>) -> Result<(), ModelError> {
        self.run(OperationKind::Add, |repository| async move {
            repository.add(&paths).await
        })
        .await
    }

    /// Write `contents` to the index entry for `path` without touching the
    /// working copy.
    pub async fn stage(&self, path: PathBuf, contents: String) -> Result<(), ModelError> {
        self.run(OperationKind::Stage, |repository| async move {
            repository.stage(&path, &contents).await
        })
        .await
    }

    /// Unstage `paths`, restoring their index entries from HEAD.
    pub async fn revert(&self, paths: Vec<PathBuf>) -> Result<(), ModelError> {
        self.run(OperationKind::RevertFiles, |repository| async move {
            repository.revert_files("HEAD", &paths).await
        })
        .await
    }

    /// Discard working-tree changes: untracked files are deleted, tracked
    /// files are checked out again.
    pub async fn clean(&self, paths: Vec<PathBuf>) -> Result<(), ModelError> {
        let snapshot = self.snapshot();
        self.run(OperationKind::Clean, |repository| async move {
            let (untracked, tracked): (Vec<PathBuf>, Vec<PathBuf>) = paths
                .into_iter()
                .map(|path| repository.root().join(path))
                .partition(|path| {
                    snapshot
                        .groups
                        .working_tree
                        .find(path)
                        .is_some_and(|r| r.status == ResourceStatus::Untracked)
                });
            repository.clean(&untracked).await?;
            if !tracked.is_empty() {
                repository.checkout("", &tracked).await?;
            }
            Ok(())
        })
        .await
    }

    pub async fn commit(&self, message: String, options: CommitOptions) -> Result<(), ModelError> {
        self.run(OperationKind::Commit, |repository| async move {
            repository.commit(&message, &options).await
        })
        .await
    }

    pub async fn branch(&self, name: String, checkout: bool) -> Result<(), ModelError> {
        self.run(OperationKind::Branch, |repository| async move {
            repository.branch(&name, checkout).await
        })
        .await
    }

    pub async fn checkout(&self, treeish: String) -> Result<(), ModelError> {
        self.run(OperationKind::Checkout, |repository| async move {
            repository.checkout(&treeish, &[]).await
        })
        .await
    }

    pub async fn reset(&self, treeish: String, hard: bool) -> Result<(), ModelError> {
        self.run(OperationKind::Reset, |repository| async move {
            repository.reset(&treeish, hard).await
        })
        .await
    }

    pub async fn fetch(&self) -> Result<(), ModelError> {
        self.run(OperationKind::Fetch, |repository| async move {
            repository.fetch().await
        })
        .await
    }

    pub async fn pull(&self, rebase: bool) -> Result<(), ModelError> {
        self.run(OperationKind::Pull, |repository| async move {
            repository.pull(rebase).await
        })
        .await
    }

    pub async fn push(
        &self,
        remote: Option<String>,
        name: Option<String>,
        set_upstream: bool,
    ) -> Result<(), ModelError> {
        self.run(OperationKind::Push, |repository| async move {
            repository
                .push(remote.as_deref(), name.as_deref(), set_upstream)
                .await
        })
        .await
    }

    /// Pull, then push the current branch.
    pub async fn sync(&self) -> Result<(), ModelError> {
        self.run(OperationKind::Sync, |repository| async move {
            repository.pull(false).await?;
            repository.push(None, None, false).await
        })
        .await
    }

    /// Content of `path` at `reference`, read once the model is quiescent.
    pub async fn show(&self, reference: String, path: PathBuf) -> Result<String, ModelError> {
        self.when_idle().await;
        self.run(OperationKind::Show, |repository| async move {
            repository.show(&reference, &path).await
        })
        .await
    }

    pub async fn get_commit_template(&self) -> Result<String, ModelError> {
        self.run(OperationKind::GetCommitTemplate, |repository| async move {
            repository.get_commit_template().await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::oneshot;
    use vcs::ClientConfig;

    async fn client() -> Option<Arc<ProcessClient>> {
        match ProcessClient::new(ClientConfig::default()).await {
            Ok(client) => Some(client),
            Err(err) => {
                eprintln!("skipping: {err}");
                None
            }
        }
    }

    fn quiet_config() -> ModelConfig {
        ModelConfig {
            watch_filesystem: false,
            ..ModelConfig::default()
        }
    }

    #[tokio::test]
    async fn test_not_a_repository_clears_flag() {
        let Some(client) = client().await else {
            return;
        };
        let dir = TempDir::new().unwrap();
        let model = Model::new(client, quiet_config(), dir.path());
        let mut events = model.subscribe();

        let err = model.status().await.unwrap_err();
        assert!(err.is_not_a_repository());
        assert_eq!(model.state(), RepositoryState::NotARepository);
        assert!(model.operations().is_idle());

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(
            seen.first(),
            Some(&ModelEvent::OperationStarted(OperationKind::Status))
        );
        assert!(seen.contains(&ModelEvent::StateChanged(RepositoryState::NotARepository)));
        assert_eq!(
            seen.last(),
            Some(&ModelEvent::OperationCompleted(OperationKind::Status))
        );
    }

    #[tokio::test]
    async fn test_read_only_skips_refresh() {
        let Some(client) = client().await else {
            return;
        };
        let dir = TempDir::new().unwrap();
        let model = Model::new(client, quiet_config(), dir.path());
        model.init().await.unwrap();
        assert_eq!(model.state(), RepositoryState::Idle);

        let before = model.snapshot();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        // Result depends on the user's global config; only the snapshot matters
        let _ = model.get_commit_template().await;
        assert!(Arc::ptr_eq(&before, &model.snapshot()));
        assert!(model.snapshot().groups.working_tree.is_empty());
    }

    #[tokio::test]
    async fn test_busy_drops_changes() {
        let Some(client) = client().await else {
            return;
        };
        let dir = TempDir::new().unwrap();
        let config = ModelConfig {
            refresh_debounce_ms: 10,
            refresh_cooldown_ms: 0,
            ..quiet_config()
        };
        let model = Model::new(client, config, dir.path());
        model.init().await.unwrap();

        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        let event = FsEvent {
            source: WatchSource::Workspace,
            path: dir.path().join("a.txt"),
        };

        let busy = model.operations().start(OperationKind::Push);
        model.inner.operations.send_replace(busy.clone());
        model.handle_fs_event(event.clone()).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(model.snapshot().groups.working_tree.is_empty());

        model
            .inner
            .operations
            .send_replace(busy.end(OperationKind::Push));
        model.handle_fs_event(event).await;

        let mut snapshots = model.watch_snapshot();
        tokio::time::timeout(
            Duration::from_secs(10),
            snapshots.wait_for(|s| !s.groups.working_tree.is_empty()),
        )
        .await
        .expect("refresh never ran")
        .unwrap();
    }

    #[tokio::test]
    async fn test_when_idle_waits_for_completion() {
        let Some(client) = client().await else {
            return;
        };
        let dir = TempDir::new().unwrap();
        let model = Model::new(client, quiet_config(), dir.path());

        model
            .inner
            .operations
            .send_modify(|ops| *ops = ops.start(OperationKind::Fetch));

        let waiter = tokio::spawn({
            let model = model.clone();
            async move { model.when_idle().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        model
            .inner
            .operations
            .send_modify(|ops| *ops = ops.end(OperationKind::Fetch));
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    async fn exclusive_step(
        model: &Model,
        kind: OperationKind,
        inside: &AtomicBool,
        overlapped: &AtomicBool,
    ) -> Result<(), ModelError> {
        model
            .run(kind, |_| async {
                if inside.swap(true, Ordering::SeqCst) {
                    overlapped.store(true, Ordering::SeqCst);
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
                inside.store(false, Ordering::SeqCst);
                Ok(())
            })
            .await
    }

    #[tokio::test]
    async fn test_mutating_operations_are_exclusive() {
        let Some(client) = client().await else {
            return;
        };
        let dir = TempDir::new().unwrap();
        let model = Model::new(client, quiet_config(), dir.path());
        model.init().await.unwrap();

        let inside = AtomicBool::new(false);
        let overlapped = AtomicBool::new(false);
        let (a, b) = tokio::join!(
            exclusive_step(&model, OperationKind::Add, &inside, &overlapped),
            exclusive_step(&model, OperationKind::Checkout, &inside, &overlapped),
        );
        a.unwrap();
        b.unwrap();
        assert!(!overlapped.load(Ordering::SeqCst));
        assert!(model.operations().is_idle());
    }

    #[tokio::test]
    async fn test_read_only_runs_beside_mutation() {
        let Some(client) = client().await else {
            return;
        };
        let dir = TempDir::new().unwrap();
        let model = Model::new(client, quiet_config(), dir.path());
        model.init().await.unwrap();

        let (entered_tx, entered_rx) = oneshot::channel::<()>();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let writer = model.run(OperationKind::Commit, |_| async move {
            let _ = entered_tx.send(());
            let _ = release_rx.await;
            Ok(())
        });
        let reader = async {
            entered_rx.await.unwrap();
            assert!(model.operations().is_running(OperationKind::Commit));
            let shown = tokio::time::timeout(
                Duration::from_secs(5),
                model.run(OperationKind::Show, |_| async { Ok(()) }),
            )
            .await;
            let _ = release_tx.send(());
            shown
        };

        let (written, shown) = tokio::join!(writer, reader);
        written.unwrap();
        shown.expect("read-only run waited on the mutation").unwrap();
        assert!(model.operations().is_idle());
    }

    #[tokio::test]
    async fn test_cancelled_run_clears_flag() {
        let Some(client) = client().await else {
            return;
        };
        let dir = TempDir::new().unwrap();
        let model = Model::new(client, quiet_config(), dir.path());
        model.init().await.unwrap();
        let mut events = model.subscribe();

        let outcome = tokio::time::timeout(
            Duration::from_millis(50),
            model.run(OperationKind::Fetch, |_| {
                std::future::pending::<Result<(), VcsError>>()
            }),
        )
        .await;
        assert!(outcome.is_err());
        assert!(model.operations().is_idle());

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(
            seen.first(),
            Some(&ModelEvent::OperationStarted(OperationKind::Fetch))
        );
        assert_eq!(
            seen.last(),
            Some(&ModelEvent::OperationCompleted(OperationKind::Fetch))
        );

        // The mutation permit went with the dropped run
        tokio::time::timeout(Duration::from_secs(5), model.status())
            .await
            .expect("permit still held")
            .unwrap();
    }
}
