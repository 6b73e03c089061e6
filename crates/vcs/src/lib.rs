//! VCS command-line layer
//!
//! This crate drives an external version-control executable and turns its
//! textual output into typed values.
//!
//! # Layers
//!
//! - **ProcessClient**: spawns the executable with a controlled environment,
//!   captures output and classifies failures
//! - **StatusParser**: pure functions from status text to [`StatusEntry`]
//!   records, and from records to [`ResourceGroups`]
//! - **Repository**: a working-copy root bound to a client, exposing the verbs
//!
//! # Example
//!
//! ```no_run
//! use vcs::{ClientConfig, ProcessClient};
//! use std::path::Path;
//!
//! # async fn run() -> Result<(), vcs::VcsError> {
//! let client = ProcessClient::new(ClientConfig::default()).await?;
//! let root = client.get_repository_root(Path::new(".")).await?;
//! let repo = client.open(&root);
//! let groups = vcs::classify(repo.root(), &repo.status().await?);
//! println!("{} staged", groups.index.len());
//! # Ok(())
//! # }
//! ```

mod blame;
mod cli;
mod error;
mod repository;
mod status;
mod types;

pub use blame::parse_porcelain as parse_annotations;
pub use cli::{ClientConfig, ExecOptions, ExecOutput, ProcessClient};
pub use error::{classify_stderr, CommandFailure, VcsError, VcsErrorCode};
pub use repository::Repository;
pub use status::{classify, parse_single_column, parse_two_column, StatusFormat};
pub use types::{
    Branch, Commit, CommitOptions, LineAnnotation, OperationKind, OperationsInProgress, Ref,
    RefKind, Remote, RepositoryState, Resource, ResourceGroup, ResourceGroupKind,
    ResourceGroups, ResourceStatus, StatusCode, StatusEntry, UNCOMMITTED_HASH,
};
