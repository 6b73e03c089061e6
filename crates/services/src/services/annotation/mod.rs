//! Per-line authorship for live editor buffers.
//!
//! The blame of a file at the reference revision is fetched once and cached;
//! each edit only re-diffs the buffer against the reference content and
//! remaps the cached annotations onto the buffer lines.

mod cache;
mod diff;
mod remap;

use std::{path::Path, sync::Arc};

use thiserror::Error;
use vcs::{LineAnnotation, Repository, VcsError};

pub use cache::{AnnotationCache, CachedBlame};
pub use diff::{LineDiff, LineHunk, SimilarLineDiff};
pub use remap::remap;

#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("failed to annotate: {0}")]
    Fetch(Arc<VcsError>),
}

impl From<Arc<VcsError>> for AnnotationError {
    fn from(err: Arc<VcsError>) -> Self {
        AnnotationError::Fetch(err)
    }
}

pub struct AnnotationEngine {
    cache: Arc<AnnotationCache>,
    differ: Arc<dyn LineDiff>,
}

impl AnnotationEngine {
    pub fn new(cache: Arc<AnnotationCache>) -> Self {
        Self::with_differ(cache, Arc::new(SimilarLineDiff))
    }

    pub fn with_differ(cache: Arc<AnnotationCache>, differ: Arc<dyn LineDiff>) -> Self {
        Self { cache, differ }
    }

    pub fn cache(&self) -> &Arc<AnnotationCache> {
        &self.cache
    }

    /// One annotation per line of `buffer`, in order.
    pub async fn annotate(
        &self,
        repository: &Arc<Repository>,
        path: &Path,
        buffer: &[&str],
    ) -> Result<Vec<LineAnnotation>, AnnotationError> {
        let blame = self.cache.get_or_fetch(repository, path).await?;
        let original: Vec<&str> = blame.reference_lines.iter().map(String::as_str).collect();
        let hunks = self.differ.diff(&original, buffer);
        let annotations = remap(&blame.annotations, &hunks);
        tracing::trace!(
            path = %path.display(),
            hunks = hunks.len(),
            lines = annotations.len(),
            "annotations remapped"
        );
        Ok(annotations)
    }

    /// [`AnnotationEngine::annotate`] over raw buffer text.
    pub async fn annotate_text(
        &self,
        repository: &Arc<Repository>,
        path: &Path,
        text: &str,
    ) -> Result<Vec<LineAnnotation>, AnnotationError> {
        let lines: Vec<&str> = text.lines().collect();
        self.annotate(repository, path, &lines).await
    }
}
