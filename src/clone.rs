//! Clone orchestration.
//!
//! `FastClone` ties the pieces together: refresh the repository's mirror,
//! clone against it, optionally check out a revision and walk the submodules.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::cache::{CacheError, GitError, ReferenceStore, validate_revision};
use crate::exec;
use crate::submodules;
use crate::types::RepoUrl;

/// Errors returned by a clone run.
#[derive(Error, Debug)]
pub enum CloneError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Git(#[from] GitError),
    /// No destination was given and none can be derived from the URL.
    #[error("cannot derive a checkout directory name from {0}; pass a path")]
    NoCheckoutName(RepoUrl),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CloneError {
    /// Exit code the process should use for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            CloneError::Cache(err) => err.exit_code(),
            CloneError::Git(err) => err.exit_code(),
            CloneError::NoCheckoutName(_) | CloneError::Io(_) => exec::FALLBACK_EXIT_CODE,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CloneError::Cache(err) if err.is_cancelled())
    }
}

/// Clones repositories through a [`ReferenceStore`].
pub struct FastClone {
    store: Arc<ReferenceStore>,
}

impl FastClone {
    pub fn new(store: Arc<ReferenceStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<ReferenceStore> {
        &self.store
    }

    /// Clone `url` into `dest`, check out `rev` if given, then fill in submodules.
    ///
    /// Returns how long the checkout took. Background prefetches may still be
    /// running when this returns; see [`FastClone::run`].
    pub fn clone(
        &self,
        url: &RepoUrl,
        rev: Option<&str>,
        dest: &Path,
    ) -> Result<Duration, CloneError> {
        let rev = rev.filter(|r| !r.is_empty());
        if let Some(rev) = rev {
            validate_revision(rev)?;
        }

        let start = Instant::now();
        let supervisor = self.store.supervisor();

        let mirror = self.store.ensure_fresh(url)?;

        supervisor.checkpoint()?;
        log::info!("Cloning {} into {}", url, dest.display());
        self.store.git().clone_with_reference(url, &mirror, dest)?;

        if let Some(rev) = rev {
            supervisor.checkpoint()?;
            log::info!("Checking out {}", rev);
            self.store.git().checkout(dest, rev)?;
        }

        submodules::update_submodules(&self.store, dest, url)?;

        let elapsed = start.elapsed();
        log::info!("Checkout of {} took {:.2}s", url, elapsed.as_secs_f64());
        Ok(elapsed)
    }

    /// Clone like [`FastClone::clone`], then wait for every background task.
    ///
    /// A foreground failure cancels outstanding work. A background failure
    /// fails the run even when the foreground clone succeeded. An interrupt
    /// takes precedence over everything else.
    pub fn run(
        &self,
        url: &RepoUrl,
        rev: Option<&str>,
        dest: &Path,
    ) -> Result<Duration, CloneError> {
        let supervisor = self.store.supervisor();

        let result = self.clone(url, rev, dest);
        if let Err(err) = &result {
            if !err.is_cancelled() {
                supervisor.cancel();
            }
        }

        let background = supervisor.join();
        match (result, background) {
            // Ctrl-C also kills the git children, so their failures are noise
            (_, Some(CacheError::Interrupted)) => Err(CacheError::Interrupted.into()),
            (Err(err), _) if !err.is_cancelled() => Err(err),
            (Err(err), None) => Err(err),
            (_, Some(failure)) => Err(failure.into()),
            (Ok(elapsed), None) => Ok(elapsed),
        }
    }
}
