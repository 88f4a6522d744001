//! Reference mirror store
//!
//! This module provides the `ReferenceStore` struct, which owns the directory of
//! reference mirrors: it creates and refreshes mirrors, keeps the per-mirror
//! "already refreshed this run" state and writes submodule manifests.
//!
//! Every mutation of a mirror or its manifest happens under that mirror's
//! lock. The lock map registers new keys through the `DashMap` entry API, so
//! two threads touching a never-seen key at the same time share one lock.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use thiserror::Error;

use super::git::{Git, GitError};
use super::manifest;
use super::paths::CachePaths;
use crate::exec;
use crate::supervisor::Supervisor;
use crate::types::{MirrorKey, RepoUrl};

/// Exit code reported when the run is interrupted with Ctrl-C.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Errors returned by cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A git operation failed.
    #[error("git error: {0}")]
    Git(#[from] GitError),
    /// An underlying IO operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The reference directory exists but is not a directory.
    #[error("reference directory {0} is not a directory")]
    BadLocation(PathBuf),
    /// `git submodule init` printed a line in an unexpected shape.
    #[error("unexpected `git submodule init` output: {0:?}")]
    MalformedSubmoduleLine(String),
    /// Another part of the run failed first.
    #[error("cancelled")]
    Cancelled,
    /// The user interrupted the run.
    #[error("interrupted")]
    Interrupted,
    /// A worker thread panicked.
    #[error("worker thread panicked: {0}")]
    TaskPanicked(String),
}

impl CacheError {
    /// Whether this error only reports that something else failed first.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CacheError::Cancelled)
    }

    /// Exit code the process should use for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            CacheError::Git(err) => err.exit_code(),
            CacheError::Interrupted => INTERRUPTED_EXIT_CODE,
            _ => exec::FALLBACK_EXIT_CODE,
        }
    }
}

/// In-memory state of one mirror for the current run.
#[derive(Debug, Default)]
struct MirrorState {
    /// Whether the mirror has been cloned or updated during this run.
    updated: bool,
}

fn lock_state(state: &Mutex<MirrorState>) -> MutexGuard<'_, MirrorState> {
    // The state is a single flag, so a panic elsewhere cannot leave it torn.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Store of reference mirrors, shared by every worker of a run.
pub struct ReferenceStore {
    paths: CachePaths,
    git: Arc<dyn Git>,
    states: DashMap<MirrorKey, Arc<Mutex<MirrorState>>>,
    supervisor: Supervisor,
    prefetch_submodules: bool,
}

impl ReferenceStore {
    /// Open the store rooted at `paths`, creating the root directory if needed.
    pub fn open(
        paths: CachePaths,
        git: Arc<dyn Git>,
        supervisor: Supervisor,
    ) -> Result<Self, CacheError> {
        paths.ensure_root().map_err(|err| {
            if err.kind() == std::io::ErrorKind::AlreadyExists {
                CacheError::BadLocation(paths.root().to_path_buf())
            } else {
                CacheError::Io(err)
            }
        })?;

        Ok(Self {
            paths,
            git,
            states: DashMap::new(),
            supervisor,
            prefetch_submodules: true,
        })
    }

    /// Enable or disable submodule manifests and prefetching.
    pub fn with_prefetch(mut self, enabled: bool) -> Self {
        self.prefetch_submodules = enabled;
        self
    }

    /// Return the paths used by this store.
    pub fn paths(&self) -> &CachePaths {
        &self.paths
    }

    /// Git implementation used for every external operation.
    pub fn git(&self) -> &dyn Git {
        self.git.as_ref()
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn prefetch_enabled(&self) -> bool {
        self.prefetch_submodules
    }

    /// On-disk location of the mirror for `url`. The mirror may not exist yet.
    pub fn mirror_path(&self, url: &RepoUrl) -> PathBuf {
        self.paths.mirror_dir(&MirrorKey::from_url(url))
    }

    fn state(&self, key: &MirrorKey) -> Arc<Mutex<MirrorState>> {
        self.states.entry(key.clone()).or_default().clone()
    }

    /// Make sure the mirror for `url` exists and has been refreshed during this run.
    /// Returns the mirror path.
    ///
    /// This will:
    /// 1. Start prefetching the mirrors listed in its manifest
    /// 2. Clone the mirror if not present
    /// 3. Fetch every ref from the remote
    ///
    /// Steps are skipped entirely once the mirror was refreshed in this run, so
    /// the prefetch fires once per mirror per run. A manifest that cannot be
    /// read only skips the prefetch.
    /// Concurrent callers for the same mirror wait until the first one is done.
    pub fn ensure_fresh(self: &Arc<Self>, url: &RepoUrl) -> Result<PathBuf, CacheError> {
        self.supervisor.checkpoint()?;

        let key = MirrorKey::from_url(url);
        let mirror = self.paths.mirror_dir(&key);
        let state = self.state(&key);
        let mut state = lock_state(&state);

        if state.updated {
            log::debug!("Reference mirror for {} is already fresh", url);
            return Ok(mirror);
        }

        if self.prefetch_submodules {
            if let Err(err) = self.spawn_prefetch(&key) {
                log::warn!("Skipping prefetch for {}: {}", url, err);
            }
        }

        if !mirror.exists() {
            self.supervisor.checkpoint()?;
            log::info!("Creating reference mirror for {}", url);
            self.git.clone_mirror(url, &mirror)?;
        }

        self.supervisor.checkpoint()?;
        log::info!("Updating reference mirror for {}", url);
        self.git.remote_update(&mirror)?;
        state.updated = true;

        Ok(mirror)
    }

    /// Warm the mirrors listed in the manifest of `url`'s mirror in the background.
    pub fn prefetch(self: &Arc<Self>, url: &RepoUrl) -> Result<(), CacheError> {
        let key = MirrorKey::from_url(url);
        let state = self.state(&key);
        let _guard = lock_state(&state);
        self.spawn_prefetch(&key)
    }

    // Caller holds the lock of `key`.
    fn spawn_prefetch(self: &Arc<Self>, key: &MirrorKey) -> Result<(), CacheError> {
        let urls = manifest::read(&self.paths.manifest_path(key))?;

        for url in urls {
            log::debug!("Prefetching reference mirror for {}", url);
            let store = Arc::clone(self);
            self.supervisor
                .spawn(format!("prefetch {}", MirrorKey::from_url(&url)), move || {
                    store.ensure_fresh(&url).map(|_| ())
                })?;
        }

        Ok(())
    }

    /// Record the submodule URLs of `url`'s repository in its manifest.
    pub fn write_manifest(&self, url: &RepoUrl, urls: &[RepoUrl]) -> Result<(), CacheError> {
        let key = MirrorKey::from_url(url);
        let state = self.state(&key);
        let _guard = lock_state(&state);

        log::debug!("Recording {} submodule(s) for {}", urls.len(), url);
        manifest::write(&self.paths.manifest_path(&key), urls)?;
        Ok(())
    }

    /// Read the submodule URLs recorded for `url`'s repository.
    pub fn read_manifest(&self, url: &RepoUrl) -> Result<Vec<RepoUrl>, CacheError> {
        let key = MirrorKey::from_url(url);
        let state = self.state(&key);
        let _guard = lock_state(&state);

        Ok(manifest::read(&self.paths.manifest_path(&key))?)
    }
}
