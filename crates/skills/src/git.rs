use std::{path::Path, process::Output};

use {
    async_trait::async_trait,
    serde::Serialize,
    tokio::process::Command,
    tracing::debug,
};

use crate::error::{Error, Result};

/// Outcome of a successful pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PullStatus {
    Updated,
    Unchanged,
}

/// Minimal git surface used by the mirror syncer.
///
/// Implementations return [`Error::AuthRequired`] when the remote demands
/// credentials and a transient [`Error::Git`] for everything else.
#[async_trait]
pub trait GitClient: Send + Sync {
    /// Clone `url` into `dest`, which must not exist yet.
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<()>;

    /// Fast-forward the working copy at `repo_dir`. Already up to date is
    /// [`PullStatus::Unchanged`], not an error.
    async fn pull(&self, repo_dir: &Path) -> Result<PullStatus>;
}

// stderr fragments git prints when a remote wants credentials.
const AUTH_MARKERS: &[&str] = &[
    "Authentication failed",
    "could not read Username",
    "could not read Password",
    "terminal prompts disabled",
    "Permission denied (publickey",
    "Host key verification failed",
];

/// [`GitClient`] backed by the system `git` executable.
#[derive(Debug, Default, Clone, Copy)]
pub struct CliGitClient;

impl CliGitClient {
    pub fn new() -> Self {
        Self
    }

    fn command(cwd: Option<&Path>) -> Command {
        let mut cmd = Command::new("git");
        if let Some(dir) = cwd {
            cmd.arg("-C").arg(dir);
        }
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd
    }

    async fn output(operation: &'static str, cmd: &mut Command) -> Result<Output> {
        cmd.output()
            .await
            .map_err(|e| Error::git(operation, format!("failed to run git: {e}")))
    }

    async fn head(repo_dir: &Path) -> Option<String> {
        let mut cmd = Self::command(Some(repo_dir));
        cmd.args(["rev-parse", "HEAD"]);
        let output = Self::output("rev-parse", &mut cmd).await.ok()?;
        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// True when `dir` is itself the top of a working copy.
pub async fn is_working_copy(dir: &Path) -> bool {
    tokio::fs::try_exists(dir.join(".git")).await.unwrap_or(false)
}

fn failure(operation: &'static str, remote: &str, output: &Output) -> Error {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if AUTH_MARKERS.iter().any(|m| stderr.contains(m)) {
        Error::AuthRequired {
            url: remote.to_string(),
        }
    } else {
        Error::git(operation, stderr.trim().to_string())
    }
}

#[async_trait]
impl GitClient for CliGitClient {
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<()> {
        let mut cmd = Self::command(None);
        cmd.args(["clone", "--quiet", "--", url]).arg(dest);
        let output = Self::output("clone", &mut cmd).await?;
        if !output.status.success() {
            tokio::fs::remove_dir_all(dest).await.ok();
            return Err(failure("clone", url, &output));
        }
        debug!(%url, dest = %dest.display(), "cloned mirror");
        Ok(())
    }

    async fn pull(&self, repo_dir: &Path) -> Result<PullStatus> {
        // `git -C` would otherwise walk up into an enclosing repository.
        if !is_working_copy(repo_dir).await {
            return Err(Error::git(
                "pull",
                format!("{} is not a git working copy", repo_dir.display()),
            ));
        }
        let before = Self::head(repo_dir).await;
        let mut cmd = Self::command(Some(repo_dir));
        cmd.args(["pull", "--ff-only", "--quiet"]);
        let output = Self::output("pull", &mut cmd).await?;
        if !output.status.success() {
            return Err(failure("pull", &repo_dir.display().to_string(), &output));
        }
        let after = Self::head(repo_dir).await;
        let status = if before == after {
            PullStatus::Unchanged
        } else {
            PullStatus::Updated
        };
        debug!(dir = %repo_dir.display(), ?status, "pulled mirror");
        Ok(status)
    }
}
