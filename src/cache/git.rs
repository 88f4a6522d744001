//! Git operations.
//!
//! Everything goes through the git CLI:
//! - `clone_mirror` / `remote_update` - maintain the bare reference mirrors
//! - `clone_with_reference` / `checkout` - produce the working checkout
//! - `submodule_init` / `submodule_update` - drive nested repositories
//!
//! The [`Git`] trait is the seam between the cache logic and the process
//! that actually talks to remotes.

use std::path::Path;
use thiserror::Error;

use crate::exec::{self, ExecError, Invocation};
use crate::types::RepoUrl;

/// Errors returned by git operations.
#[derive(Error, Debug)]
pub enum GitError {
    /// The git process failed.
    #[error(transparent)]
    Exec(#[from] ExecError),
    /// Invalid inputs were provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Underlying IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GitError {
    /// Exit code the process should use for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            GitError::Exec(err) => err.exit_code(),
            GitError::InvalidInput(_) | GitError::Io(_) => exec::FALLBACK_EXIT_CODE,
        }
    }
}

/// Check a revision given on the command line before it reaches `git checkout`.
///
/// Any branch, tag or commit name is accepted as long as git cannot mistake it
/// for an option and it fits on one argv line.
pub fn validate_revision(rev: &str) -> Result<(), GitError> {
    if rev.starts_with('-') {
        return Err(GitError::InvalidInput(format!(
            "revision {:?} would be read as an option",
            rev
        )));
    }
    if rev.chars().any(char::is_control) {
        return Err(GitError::InvalidInput(format!(
            "revision {:?} contains control characters",
            rev
        )));
    }
    if rev.is_empty() {
        return Err(GitError::InvalidInput("revision is empty".to_string()));
    }
    Ok(())
}

/// External git operations used by the clone engine.
pub trait Git: Send + Sync {
    /// Create a bare mirror of `url` at `dest`.
    fn clone_mirror(&self, url: &RepoUrl, dest: &Path) -> Result<(), GitError>;

    /// Fetch all refs of every remote into an existing mirror.
    fn remote_update(&self, mirror: &Path) -> Result<(), GitError>;

    /// Clone `url` into `dest`, borrowing objects from `mirror`.
    fn clone_with_reference(&self, url: &RepoUrl, mirror: &Path, dest: &Path)
    -> Result<(), GitError>;

    /// Check out `rev` in the working tree at `dir`.
    fn checkout(&self, dir: &Path, rev: &str) -> Result<(), GitError>;

    /// Register the submodules declared in `dir` and return git's listing.
    fn submodule_init(&self, dir: &Path) -> Result<String, GitError>;

    /// Update the submodule at `path` (relative to `dir`) using `mirror` as reference.
    fn submodule_update(&self, dir: &Path, mirror: &Path, path: &Path) -> Result<(), GitError>;
}

/// Git CLI wrapper with hardening.
pub struct GitCli {
    git_path: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCli {
    /// Create a new GitCli instance using the system git.
    pub fn new() -> Self {
        Self {
            git_path: "git".into(),
        }
    }

    /// Use a specific git binary.
    pub fn with_path(git_path: impl Into<String>) -> Self {
        Self {
            git_path: git_path.into(),
        }
    }

    /// Create a hardened invocation.
    ///
    /// Applies `GIT_TERMINAL_PROMPT=0` so a worker thread never blocks on a
    /// credential prompt nobody can answer.
    fn command(&self) -> Invocation {
        Invocation::new(&self.git_path).env("GIT_TERMINAL_PROMPT", "0")
    }
}

impl Git for GitCli {
    fn clone_mirror(&self, url: &RepoUrl, dest: &Path) -> Result<(), GitError> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        exec::run(
            &self
                .command()
                .args(["clone", "--mirror", "--"])
                .arg(url.as_str())
                .arg(dest),
        )?;
        Ok(())
    }

    fn remote_update(&self, mirror: &Path) -> Result<(), GitError> {
        exec::run(&self.command().args(["remote", "update"]).current_dir(mirror))?;
        Ok(())
    }

    fn clone_with_reference(
        &self,
        url: &RepoUrl,
        mirror: &Path,
        dest: &Path,
    ) -> Result<(), GitError> {
        exec::run(
            &self
                .command()
                .args(["clone", "--reference"])
                .arg(mirror)
                .arg("--")
                .arg(url.as_str())
                .arg(dest),
        )?;
        Ok(())
    }

    fn checkout(&self, dir: &Path, rev: &str) -> Result<(), GitError> {
        validate_revision(rev)?;

        exec::run(&self.command().args(["checkout", rev]).current_dir(dir))?;
        Ok(())
    }

    fn submodule_init(&self, dir: &Path) -> Result<String, GitError> {
        let output = exec::run(&self.command().args(["submodule", "init"]).current_dir(dir))?;
        Ok(output)
    }

    fn submodule_update(&self, dir: &Path, mirror: &Path, path: &Path) -> Result<(), GitError> {
        exec::run(
            &self
                .command()
                .args(["submodule", "update", "--reference"])
                .arg(mirror)
                .arg("--")
                .arg(path)
                .current_dir(dir),
        )?;
        Ok(())
    }
}
