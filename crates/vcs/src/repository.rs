//! Per-working-copy handle exposing the VCS verbs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{
    blame,
    cli::{ExecOptions, ProcessClient},
    error::VcsError,
    types::{Branch, Commit, CommitOptions, LineAnnotation, Ref, RefKind, Remote, StatusEntry},
};

#[derive(Debug, Clone)]
pub struct Repository {
    client: Arc<ProcessClient>,
    root: PathBuf,
}

impl Repository {
    pub fn new(client: Arc<ProcessClient>, root: PathBuf) -> Self {
        Self { client, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn client(&self) -> &Arc<ProcessClient> {
        &self.client
    }

    async fn run<I, S>(&self, args: I) -> Result<String, VcsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        Ok(self.client.exec(&self.root, args).await?.stdout)
    }

    /// Paths as the tool expects them: root-relative with forward slashes.
    fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.to_string_lossy().replace('\\', "/")
    }

    fn relative_all(&self, paths: &[PathBuf]) -> Vec<String> {
        paths.iter().map(|p| self.relative(p)).collect()
    }

    pub async fn status(&self) -> Result<Vec<StatusEntry>, VcsError> {
        let format = self.client.status_format();
        let raw = self.run(format.args()).await?;
        Ok(format.parse(&raw))
    }

    /// Stage additions, modifications and removals. No paths means everything.
    pub async fn add(&self, paths: &[PathBuf]) -> Result<(), VcsError> {
        let mut args = vec!["add".to_string(), "-A".to_string(), "--".to_string()];
        args.extend(self.relative_all(paths));
        self.run(args).await?;
        Ok(())
    }

    /// Write `contents` into the index as the staged version of `path`.
    pub async fn stage(&self, path: &Path, contents: &str) -> Result<(), VcsError> {
        let rel = self.relative(path);
        let out = self
            .client
            .exec_with(
                &self.root,
                ["hash-object", "--stdin", "-w", "--path", rel.as_str()],
                ExecOptions::with_input(contents),
            )
            .await?;
        let hash = out.stdout.trim();

        let mode = self
            .run(["ls-files", "--stage", "--", rel.as_str()])
            .await?
            .split_whitespace()
            .next()
            .unwrap_or("100644")
            .to_string();

        let cacheinfo = format!("{mode},{hash},{rel}");
        self.run(["update-index", "--add", "--cacheinfo", cacheinfo.as_str()])
            .await?;
        Ok(())
    }

    /// Unstage `paths`, resetting their index entries to `treeish`.
    pub async fn revert_files(&self, treeish: &str, paths: &[PathBuf]) -> Result<(), VcsError> {
        let mut args = vec![
            "reset".to_string(),
            "-q".to_string(),
            treeish.to_string(),
            "--".to_string(),
        ];
        args.extend(self.relative_all(paths));

        let err = match self.run(args).await {
            Ok(_) => return Ok(()),
            Err(err) => err,
        };

        // Nothing to reset against before the first commit
        if treeish != "HEAD" || self.get_commit("HEAD").await.is_ok() {
            return Err(err);
        }
        tracing::debug!("reset without HEAD, removing from index instead: {err}");
        let mut args = vec![
            "rm".to_string(),
            "--cached".to_string(),
            "-r".to_string(),
            "-q".to_string(),
            "--".to_string(),
        ];
        args.extend(self.relative_all(paths));
        self.run(args).await?;
        Ok(())
    }

    /// Delete untracked files.
    pub async fn clean(&self, paths: &[PathBuf]) -> Result<(), VcsError> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec![
            "clean".to_string(),
            "-f".to_string(),
            "-q".to_string(),
            "--".to_string(),
        ];
        args.extend(self.relative_all(paths));
        self.run(args).await?;
        Ok(())
    }

    /// Check out `treeish`, or restore `paths` from it when given.
    pub async fn checkout(&self, treeish: &str, paths: &[PathBuf]) -> Result<(), VcsError> {
        let mut args = vec!["checkout".to_string(), "-q".to_string()];
        if !treeish.is_empty() {
            args.push(treeish.to_string());
        }
        if !paths.is_empty() {
            args.push("--".to_string());
            args.extend(self.relative_all(paths));
        }
        self.run(args).await?;
        Ok(())
    }

    /// Commit with the message streamed over stdin.
    pub async fn commit(&self, message: &str, opts: &CommitOptions) -> Result<(), VcsError> {
        let mut args = vec!["commit", "--quiet", "--allow-empty-message", "--file", "-"];
        if opts.all {
            args.push("--all");
        }
        if opts.amend {
            args.push("--amend");
        }
        if opts.signoff {
            args.push("--signoff");
        }
        self.client
            .exec_with(&self.root, args, ExecOptions::with_input(message))
            .await?;
        Ok(())
    }

    pub async fn branch(&self, name: &str, checkout: bool) -> Result<(), VcsError> {
        if checkout {
            self.run(["checkout", "-q", "-b", name]).await?;
        } else {
            self.run(["branch", "-q", name]).await?;
        }
        Ok(())
    }

    pub async fn reset(&self, treeish: &str, hard: bool) -> Result<(), VcsError> {
        let mode = if hard { "--hard" } else { "--mixed" };
        self.run(["reset", mode, treeish, "--"]).await?;
        Ok(())
    }

    pub async fn fetch(&self) -> Result<(), VcsError> {
        self.run(["fetch"]).await?;
        Ok(())
    }

    pub async fn pull(&self, rebase: bool) -> Result<(), VcsError> {
        if rebase {
            self.run(["pull", "--rebase"]).await?;
        } else {
            self.run(["pull"]).await?;
        }
        Ok(())
    }

    pub async fn push(
        &self,
        remote: Option<&str>,
        name: Option<&str>,
        set_upstream: bool,
    ) -> Result<(), VcsError> {
        let mut args = vec!["push"];
        if set_upstream {
            args.push("-u");
        }
        if let Some(remote) = remote {
            args.push(remote);
        }
        if let Some(name) = name {
            args.push(name);
        }
        self.run(args).await?;
        Ok(())
    }

    /// Contents of `path` at `reference`.
    pub async fn show(&self, reference: &str, path: &Path) -> Result<String, VcsError> {
        let object = format!("{reference}:{}", self.relative(path));
        self.run(["show", object.as_str()]).await
    }

    pub async fn config_get(&self, key: &str) -> Result<Option<String>, VcsError> {
        let out = self
            .client
            .exec_with(
                &self.root,
                ["config", "--get", key],
                ExecOptions {
                    input: None,
                    allow_failure: true,
                },
            )
            .await?;
        // Exit code 1 means the key is unset
        match out.exit_code {
            Some(0) => Ok(Some(out.stdout.trim().to_string())),
            Some(1) => Ok(None),
            _ => Err(VcsError::InvalidOperation(format!(
                "config --get {key} failed: {}",
                out.stderr.trim()
            ))),
        }
    }

    pub async fn config_set(&self, key: &str, value: &str) -> Result<(), VcsError> {
        self.run(["config", key, value]).await?;
        Ok(())
    }

    /// Commit message template, with comment lines removed.
    pub async fn get_commit_template(&self) -> Result<String, VcsError> {
        let Some(raw_path) = self.config_get("commit.template").await? else {
            return Ok(String::new());
        };
        if raw_path.is_empty() {
            return Ok(String::new());
        }

        let path = utils::path::resolve_user_path(&raw_path, &self.root);
        let raw = tokio::fs::read_to_string(&path).await?;
        Ok(strip_comment_lines(&raw))
    }

    /// Per-line authorship of `path` at `revision`.
    ///
    /// A path that does not exist at `revision`, or a `revision` that does
    /// not resolve yet, has no annotations.
    pub async fn annotate(
        &self,
        path: &Path,
        revision: &str,
    ) -> Result<Vec<LineAnnotation>, VcsError> {
        let rel = self.relative(path);
        match self
            .run(["blame", "--porcelain", revision, "--", rel.as_str()])
            .await
        {
            Ok(raw) => Ok(blame::parse_porcelain(&raw)),
            Err(err) if err.is_missing_in_revision() => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    /// Reference content paired with [`Repository::annotate`]; empty when the
    /// path is absent at `revision`.
    pub async fn show_or_empty(&self, revision: &str, path: &Path) -> Result<String, VcsError> {
        match self.show(revision, path).await {
            Ok(content) => Ok(content),
            Err(err) if err.is_missing_in_revision() => Ok(String::new()),
            Err(err) => Err(err),
        }
    }

    pub async fn get_head(&self) -> Result<Branch, VcsError> {
        let symbolic = self
            .client
            .exec_with(
                &self.root,
                ["symbolic-ref", "--short", "HEAD"],
                ExecOptions {
                    input: None,
                    allow_failure: true,
                },
            )
            .await?;

        if symbolic.exit_code == Some(0) {
            let name = symbolic.stdout.trim().to_string();
            // An unborn branch has a name but no commit yet
            let err = match self.get_branch(&name).await {
                Ok(branch) => return Ok(branch),
                Err(err) => err,
            };
            if self.get_commit("HEAD").await.is_ok() {
                return Err(err);
            }
            return Ok(Branch {
                name: Some(name),
                ..Branch::default()
            });
        }

        let commit = self.run(["rev-parse", "HEAD"]).await?;
        Ok(Branch {
            name: None,
            commit: Some(commit.trim().to_string()),
            ..Branch::default()
        })
    }

    /// Resolve a branch with its upstream and divergence counts.
    pub async fn get_branch(&self, name: &str) -> Result<Branch, VcsError> {
        let commit = self.run(["rev-parse", name]).await?.trim().to_string();
        if commit.is_empty() {
            return Err(VcsError::Parse(format!("no commit for branch {name}")));
        }

        let upstream_spec = format!("{name}@{{u}}");
        let upstream = self
            .client
            .exec_with(
                &self.root,
                ["rev-parse", "--abbrev-ref", upstream_spec.as_str()],
                ExecOptions {
                    input: None,
                    allow_failure: true,
                },
            )
            .await?;

        let mut branch = Branch {
            name: Some(name.to_string()),
            commit: Some(commit),
            ..Branch::default()
        };
        if upstream.exit_code != Some(0) {
            return Ok(branch);
        }

        let upstream = upstream.stdout.trim().to_string();
        let range = format!("{name}...{upstream}");
        let counts = self
            .run(["rev-list", "--left-right", "--count", range.as_str()])
            .await?;
        let (ahead, behind) = parse_ahead_behind(&counts)?;
        branch.upstream = Some(upstream);
        branch.ahead = Some(ahead);
        branch.behind = Some(behind);
        Ok(branch)
    }

    pub async fn get_refs(&self) -> Result<Vec<Ref>, VcsError> {
        let raw = self
            .run([
                "for-each-ref",
                "--format",
                "%(refname) %(objectname)",
                "--sort",
                "-committerdate",
            ])
            .await?;
        Ok(parse_refs(&raw))
    }

    pub async fn get_remotes(&self) -> Result<Vec<Remote>, VcsError> {
        let raw = self.run(["remote", "--verbose"]).await?;
        let mut remotes: Vec<Remote> = Vec::new();
        for line in raw.lines() {
            let mut parts = line.split_whitespace();
            let (Some(name), Some(url)) = (parts.next(), parts.next()) else {
                continue;
            };
            if !remotes.iter().any(|r| r.name == name) {
                remotes.push(Remote {
                    name: name.to_string(),
                    url: url.to_string(),
                });
            }
        }
        Ok(remotes)
    }

    pub async fn get_commit(&self, reference: &str) -> Result<Commit, VcsError> {
        let raw = self
            .run(["show", "-s", "--format=%H%n%P%n%B", reference])
            .await?;
        let mut lines = raw.lines();
        let hash = lines
            .next()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| VcsError::Parse(format!("no commit for {reference}")))?
            .to_string();
        let parents = lines
            .next()
            .unwrap_or("")
            .split_whitespace()
            .map(String::from)
            .collect();
        let message = lines.collect::<Vec<_>>().join("\n").trim().to_string();
        Ok(Commit {
            hash,
            message,
            parents,
        })
    }
}

fn strip_comment_lines(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn parse_ahead_behind(raw: &str) -> Result<(u32, u32), VcsError> {
    let mut parts = raw.split_whitespace().map(str::parse::<u32>);
    match (parts.next(), parts.next()) {
        (Some(Ok(ahead)), Some(Ok(behind))) => Ok((ahead, behind)),
        _ => Err(VcsError::Parse(format!(
            "unexpected rev-list output: {:?}",
            raw.trim()
        ))),
    }
}

fn parse_refs(raw: &str) -> Vec<Ref> {
    raw.lines()
        .filter_map(|line| {
            let (refname, commit) = line.split_once(' ')?;
            let (kind, name) = if let Some(name) = refname.strip_prefix("refs/heads/") {
                (RefKind::Branch, name)
            } else if let Some(name) = refname.strip_prefix("refs/remotes/") {
                (RefKind::RemoteHead, name)
            } else if let Some(name) = refname.strip_prefix("refs/tags/") {
                (RefKind::Tag, name)
            } else {
                return None;
            };
            Some(Ref {
                name: name.to_string(),
                commit: commit.trim().to_string(),
                kind,
            })
        })
        .collect()
}
