//! Locating external executables on PATH.

use std::path::{Path, PathBuf};

/// Resolve `name` to an absolute executable path without blocking the runtime.
pub async fn resolve_executable_path(name: &str) -> Option<PathBuf> {
    let name = name.to_string();
    tokio::task::spawn_blocking(move || resolve_executable_path_blocking(&name))
        .await
        .ok()
        .flatten()
}

pub fn resolve_executable_path_blocking(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.is_absolute() {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    which::which(name).ok()
}
