//! Wrapper around the external VCS executable.
//!
//! Every invocation is an explicit argument vector run with a controlled
//! environment. Stdout and stderr are captured in full; a non-zero exit is
//! turned into a [`CommandFailure`] whose stderr has been classified.

use std::{
    collections::BTreeMap,
    ffi::OsStr,
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
};

use tokio::{io::AsyncWriteExt, process::Command};
use utils::shell::resolve_executable_path;

use crate::{
    error::{classify_stderr, CommandFailure, VcsError},
    repository::Repository,
    status::StatusFormat,
};

/// Configuration for the process client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Name or absolute path of the executable
    pub executable: String,
    pub status_format: StatusFormat,
    /// Extra environment applied on top of the defaults
    pub env: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            executable: "git".to_string(),
            status_format: StatusFormat::default(),
            env: BTreeMap::new(),
        }
    }
}

/// Captured output of a finished process
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Per-call options
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Written to stdin, which is then closed
    pub input: Option<String>,
    /// Return the output even when the exit code is non-zero
    pub allow_failure: bool,
}

impl ExecOptions {
    pub fn with_input(input: impl Into<String>) -> Self {
        Self {
            input: Some(input.into()),
            allow_failure: false,
        }
    }
}

// Keep stderr in a stable language so classification keeps working.
const DEFAULT_ENV: [(&str, &str); 4] = [
    ("LC_MESSAGES", "C"),
    ("LANGUAGE", "C"),
    ("GIT_PAGER", "cat"),
    ("GIT_TERMINAL_PROMPT", "0"),
];

#[derive(Debug)]
pub struct ProcessClient {
    executable: PathBuf,
    status_format: StatusFormat,
    env: BTreeMap<String, String>,
}

impl ProcessClient {
    /// Resolve the configured executable and build a client.
    pub async fn new(config: ClientConfig) -> Result<Arc<Self>, VcsError> {
        let executable = resolve_executable_path(&config.executable)
            .await
            .ok_or_else(|| VcsError::Spawn {
                executable: PathBuf::from(&config.executable),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "executable not found on PATH",
                ),
            })?;
        Ok(Arc::new(Self::with_executable(executable, config)))
    }

    /// Build a client for an already resolved executable.
    pub fn with_executable(executable: PathBuf, config: ClientConfig) -> Self {
        let mut env: BTreeMap<String, String> = DEFAULT_ENV
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        env.extend(config.env);
        Self {
            executable,
            status_format: config.status_format,
            env,
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn status_format(&self) -> StatusFormat {
        self.status_format
    }

    /// Open a repository handle bound to this client.
    pub fn open(self: &Arc<Self>, root: impl Into<PathBuf>) -> Repository {
        Repository::new(Arc::clone(self), root.into())
    }

    /// Resolve the working-copy root containing `path`.
    pub async fn get_repository_root(&self, path: &Path) -> Result<PathBuf, VcsError> {
        let out = self.exec(path, ["rev-parse", "--show-toplevel"]).await?;
        let root = out.stdout.trim();
        if root.is_empty() {
            return Err(VcsError::repo_not_found(path));
        }
        Ok(PathBuf::from(root))
    }

    /// Create a new repository at `path`.
    pub async fn init(&self, path: &Path) -> Result<(), VcsError> {
        self.exec(path, ["init"]).await?;
        Ok(())
    }

    pub async fn exec<I, S>(&self, cwd: &Path, args: I) -> Result<ExecOutput, VcsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.exec_with(cwd, args, ExecOptions::default()).await
    }

    pub async fn exec_with<I, S>(
        &self,
        cwd: &Path,
        args: I,
        options: ExecOptions,
    ) -> Result<ExecOutput, VcsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.as_ref().to_string_lossy().into_owned())
            .collect();

        let mut cmd = Command::new(&self.executable);
        cmd.current_dir(cwd)
            .args(&args)
            .envs(&self.env)
            .stdin(if options.input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::trace!(cwd = %cwd.display(), "Running {} {}", self.executable.display(), args.join(" "));

        let mut child = cmd.spawn().map_err(|source| VcsError::Spawn {
            executable: self.executable.clone(),
            source,
        })?;

        if let Some(input) = options.input {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(input.as_bytes()).await?;
                stdin.shutdown().await?;
            }
        }

        let output = child.wait_with_output().await?;
        let result = ExecOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if output.status.success() || options.allow_failure {
            return Ok(result);
        }

        let code = classify_stderr(&result.stderr);
        tracing::debug!(
            args = %args.join(" "),
            exit_code = ?result.exit_code,
            ?code,
            "command failed"
        );
        Err(VcsError::Command(Box::new(CommandFailure {
            args,
            exit_code: result.exit_code,
            stdout: result.stdout,
            stderr: result.stderr,
            code,
        })))
    }
}
