use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, MutexGuard, Weak,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::FutureExt;
use tokio::{sync::broadcast, task::JoinHandle};
use vcs::{LineAnnotation, Repository, VcsError};

use crate::services::{
    debounce::{Debouncer, Throttled},
    model::ModelEvent,
};

/// Blame of one file at the reference revision, index-aligned with the
/// file's lines at that revision.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedBlame {
    pub annotations: Vec<LineAnnotation>,
    pub reference_lines: Vec<String>,
}

impl CachedBlame {
    fn new(mut annotations: Vec<LineAnnotation>, content: &str) -> Self {
        let reference_lines: Vec<String> = content.lines().map(str::to_string).collect();
        if annotations.len() != reference_lines.len() {
            tracing::warn!(
                annotations = annotations.len(),
                lines = reference_lines.len(),
                "blame does not cover the reference content"
            );
            annotations.resize_with(reference_lines.len(), LineAnnotation::uncommitted);
        }
        Self {
            annotations,
            reference_lines,
        }
    }
}

type FetchResult = Result<Arc<CachedBlame>, Arc<VcsError>>;

/// Per-file blame cache owned by an annotation engine.
///
/// The external tool runs at most once per file until the entry is
/// invalidated; concurrent misses for the same file share one fetch.
pub struct AnnotationCache {
    revision: String,
    entries: Mutex<HashMap<PathBuf, Arc<CachedBlame>>>,
    fetches: Throttled<PathBuf, FetchResult>,
    /// Bumped on every invalidation so fetches started earlier are not stored
    generation: AtomicU64,
    fetch_count: AtomicUsize,
}

impl Default for AnnotationCache {
    fn default() -> Self {
        Self::new("HEAD")
    }
}

impl AnnotationCache {
    pub fn new(revision: impl Into<String>) -> Self {
        Self {
            revision: revision.into(),
            entries: Mutex::new(HashMap::new()),
            fetches: Throttled::new(),
            generation: AtomicU64::new(0),
            fetch_count: AtomicUsize::new(0),
        }
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<PathBuf, Arc<CachedBlame>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Entries are keyed by absolute path; relative paths resolve against
    /// the repository root.
    fn key(repository: &Repository, path: &Path) -> PathBuf {
        repository.root().join(path)
    }

    pub fn get(&self, repository: &Repository, path: &Path) -> Option<Arc<CachedBlame>> {
        self.entries().get(&Self::key(repository, path)).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Times the external tool has been asked for a blame.
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// Drop the entry for `path`, e.g. when its document closes. A fetch
    /// already running for it is detached so the next miss fetches again.
    pub fn invalidate(&self, repository: &Repository, path: &Path) {
        let key = Self::key(repository, path);
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.fetches.forget(&key);
        self.entries().remove(&key);
    }

    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.fetches.forget_all();
        let mut entries = self.entries();
        if !entries.is_empty() {
            tracing::debug!(files = entries.len(), "annotation cache cleared");
        }
        entries.clear();
    }

    pub async fn get_or_fetch(
        &self,
        repository: &Arc<Repository>,
        path: &Path,
    ) -> Result<Arc<CachedBlame>, Arc<VcsError>> {
        let path = Self::key(repository, path);
        if let Some(hit) = self.entries().get(&path).cloned() {
            return Ok(hit);
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let result = self
            .fetches
            .call(path.clone(), || {
                self.fetch_count.fetch_add(1, Ordering::SeqCst);
                let repository = repository.clone();
                let path = path.clone();
                let revision = self.revision.clone();
                async move {
                    let (annotations, content) = tokio::try_join!(
                        repository.annotate(&path, &revision),
                        repository.show_or_empty(&revision, &path),
                    )
                    .map_err(Arc::new)?;
                    Ok::<_, Arc<VcsError>>(Arc::new(CachedBlame::new(annotations, &content)))
                }
                .boxed()
            })
            .await;

        let blame = result?;
        if self.generation.load(Ordering::SeqCst) == generation {
            self.entries().insert(path, blame.clone());
        }
        Ok(blame)
    }

    /// Clear the cache once model events stop arriving for `delay` after a
    /// repository change. The task ends when the event channel closes.
    pub fn invalidate_on_change(
        self: &Arc<Self>,
        mut events: broadcast::Receiver<ModelEvent>,
        delay: Duration,
    ) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let clear = Debouncer::spawn(delay, Duration::ZERO, move || {
                let weak = weak.clone();
                async move {
                    if let Some(cache) = weak.upgrade() {
                        cache.clear();
                    }
                }
            });
            loop {
                match events.recv().await {
                    Ok(ModelEvent::ResourcesChanged) => clear.trigger(),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::trace!(skipped, "model events lagged");
                        clear.trigger();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
