use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Recognised failure classes of the external tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcsErrorCode {
    AuthenticationFailed,
    NotARepository,
    DirtyWorkTree,
    PushRejected,
    RemoteConnectionError,
    UnmergedChanges,
    NoUserNameConfigured,
    NoUserEmailConfigured,
    RepositoryIsLocked,
    NoRemoteRepositorySpecified,
    BranchAlreadyExists,
    InvalidBranchName,
    NoRemoteReference,
    PathNotInRevision,
    RevisionNotFound,
}

impl VcsErrorCode {
    /// Message suitable for showing to the user as-is.
    pub fn user_message(self) -> &'static str {
        match self {
            VcsErrorCode::AuthenticationFailed => "Authentication failed",
            VcsErrorCode::NotARepository => "No repository found",
            VcsErrorCode::DirtyWorkTree => "Please clean your repository working tree first",
            VcsErrorCode::PushRejected => "Push rejected; pull first and try again",
            VcsErrorCode::RemoteConnectionError => "Could not connect to the remote repository",
            VcsErrorCode::UnmergedChanges => "Resolve the unmerged changes first",
            VcsErrorCode::NoUserNameConfigured => "Configure a user name before committing",
            VcsErrorCode::NoUserEmailConfigured => "Configure a user email before committing",
            VcsErrorCode::RepositoryIsLocked => "The repository is locked by another process",
            VcsErrorCode::NoRemoteRepositorySpecified => "No remote repository is configured",
            VcsErrorCode::BranchAlreadyExists => "A branch with that name already exists",
            VcsErrorCode::InvalidBranchName => "Invalid branch name",
            VcsErrorCode::NoRemoteReference => "The remote reference does not exist",
            VcsErrorCode::PathNotInRevision => "The file does not exist in that revision",
            VcsErrorCode::RevisionNotFound => "The revision does not exist",
        }
    }
}

impl fmt::Display for VcsErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// Ordered: the first matching pattern wins.
static STDERR_PATTERNS: LazyLock<Vec<(Regex, VcsErrorCode)>> = LazyLock::new(|| {
    let table: [(&str, VcsErrorCode); 15] = [
        (
            r"(?i)authentication failed|could not read username|invalid username or password",
            VcsErrorCode::AuthenticationFailed,
        ),
        (
            r"(?i)not a git repository|no repository found|there is no repository",
            VcsErrorCode::NotARepository,
        ),
        (
            r"\.lock': File exists|Unable to create '.*\.lock'|(?i)waiting for lock",
            VcsErrorCode::RepositoryIsLocked,
        ),
        (
            r"(?i)unable to auto-detect email address",
            VcsErrorCode::NoUserEmailConfigured,
        ),
        (
            r"(?i)please tell me who you are|no username supplied",
            VcsErrorCode::NoUserNameConfigured,
        ),
        (
            r"(?i)you have unmerged files|unmerged changes|you need to resolve your current index first",
            VcsErrorCode::UnmergedChanges,
        ),
        (
            r"(?i)please,? commit your changes or stash them|your local changes to the following files would be overwritten|you have unstaged changes|uncommitted changes",
            VcsErrorCode::DirtyWorkTree,
        ),
        (
            r"(?m)^error: failed to push some refs to\b|\[rejected\]|(?i)non-fast-forward",
            VcsErrorCode::PushRejected,
        ),
        (
            r"(?i)no configured push destination|no remote repository specified|does not appear to be a git repository",
            VcsErrorCode::NoRemoteRepositorySpecified,
        ),
        (
            r"(?i)could not read from remote repository|could not resolve host|connection refused|unable to access",
            VcsErrorCode::RemoteConnectionError,
        ),
        (
            r"A branch named '.+' already exists",
            VcsErrorCode::BranchAlreadyExists,
        ),
        (
            r"'.+' is not a valid branch name",
            VcsErrorCode::InvalidBranchName,
        ),
        (r"Couldn't find remote ref", VcsErrorCode::NoRemoteReference),
        (
            r"no such path '.+' in|path '.+' does not exist in|exists on disk, but not in",
            VcsErrorCode::PathNotInRevision,
        ),
        (
            r"(?i)invalid object name|no such ref|bad revision|unknown revision",
            VcsErrorCode::RevisionNotFound,
        ),
    ];

    table
        .into_iter()
        .filter_map(|(pattern, code)| match Regex::new(pattern) {
            Ok(re) => Some((re, code)),
            Err(err) => {
                tracing::error!("invalid stderr pattern {pattern:?}: {err}");
                None
            }
        })
        .collect()
});

/// Map human-readable stderr text onto the bounded taxonomy.
pub fn classify_stderr(stderr: &str) -> Option<VcsErrorCode> {
    STDERR_PATTERNS
        .iter()
        .find(|(re, _)| re.is_match(stderr))
        .map(|(_, code)| *code)
}

/// A non-zero exit of the external tool
#[derive(Debug, Clone)]
pub struct CommandFailure {
    pub args: Vec<String>,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub code: Option<VcsErrorCode>,
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self.code {
            Some(code) => code.user_message(),
            None => "command failed",
        };
        write!(f, "{message} ({})", self.args.join(" "))?;
        if let Some(exit_code) = self.exit_code {
            write!(f, " exited with {exit_code}")?;
        }
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            write!(f, ": {stderr}")?;
        }
        Ok(())
    }
}

/// Errors that can occur during VCS operations
#[derive(Debug, Error)]
pub enum VcsError {
    #[error("failed to spawn {executable}: {source}")]
    Spawn {
        executable: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Command(Box<CommandFailure>),

    #[error("Repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl VcsError {
    /// Create a RepositoryNotFound error from a path
    pub fn repo_not_found(path: &Path) -> Self {
        Self::RepositoryNotFound(path.display().to_string())
    }

    pub fn code(&self) -> Option<VcsErrorCode> {
        match self {
            VcsError::Command(failure) => failure.code,
            VcsError::RepositoryNotFound(_) => Some(VcsErrorCode::NotARepository),
            _ => None,
        }
    }

    pub fn is_not_a_repository(&self) -> bool {
        self.code() == Some(VcsErrorCode::NotARepository)
    }

    /// The path or the revision itself is absent, as in a repository
    /// without commits.
    pub fn is_missing_in_revision(&self) -> bool {
        matches!(
            self.code(),
            Some(VcsErrorCode::PathNotInRevision | VcsErrorCode::RevisionNotFound)
        )
    }
}
