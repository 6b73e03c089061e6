//! Filesystem watchers feeding the model's event loop.

use std::path::{Path, PathBuf};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Which watcher reported a change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchSource {
    /// The metadata directory of a resolved repository
    Metadata,
    /// The whole workspace
    Workspace,
    /// The workspace root while it is not a repository
    RootProbe,
}

#[derive(Debug, Clone)]
pub struct FsEvent {
    pub source: WatchSource,
    pub path: PathBuf,
}

fn in_metadata_dir(path: &Path, metadata_dir: &str) -> bool {
    path.components().any(|c| c.as_os_str() == metadata_dir)
}

/// Whether a change reported by `source` should schedule a refresh.
pub fn is_relevant_change(
    source: WatchSource,
    path: &Path,
    metadata_dir: &str,
    lock_file: &str,
) -> bool {
    match source {
        WatchSource::Metadata => path.file_name().is_none_or(|name| name != lock_file),
        WatchSource::Workspace => !in_metadata_dir(path, metadata_dir),
        WatchSource::RootProbe => in_metadata_dir(path, metadata_dir),
    }
}

/// Keeps a native watcher alive; dropping it stops the events.
pub struct FsWatcher {
    _watcher: RecommendedWatcher,
    path: PathBuf,
}

impl std::fmt::Debug for FsWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsWatcher").field("path", &self.path).finish()
    }
}

pub fn watch(
    path: &Path,
    recursive: bool,
    source: WatchSource,
    tx: mpsc::UnboundedSender<FsEvent>,
) -> Result<FsWatcher, notify::Error> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(event) => {
                for path in event.paths {
                    if tx.send(FsEvent { source, path }).is_err() {
                        return;
                    }
                }
            }
            Err(err) => tracing::warn!(?source, "filesystem watch error: {err}"),
        }
    })?;

    let mode = if recursive {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    watcher.watch(path, mode)?;
    tracing::debug!(?source, path = %path.display(), recursive, "watching");

    Ok(FsWatcher {
        _watcher: watcher,
        path: path.to_path_buf(),
    })
}
