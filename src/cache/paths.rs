//! Reference directory path management
//!
//! This module provides the `CachePaths` struct which manages all filesystem paths
//! for the reference directory layout:
//!
//! ```text
//! /var/tmp/git-fastclone/reference/
//! ├── github.com-owner-repo.git/                 # Mirror clone
//! ├── github.com-owner-repo.git:submodules.txt   # Nested URLs seen last time
//! └── github.com-owner-lib.git/
//! ```
//!
//! `:` never appears in a [`MirrorKey`], so a manifest path cannot collide
//! with a mirror directory.

use std::io;
use std::path::{Path, PathBuf};

use crate::types::MirrorKey;

/// Default reference directory when no override is configured
pub const DEFAULT_REFERENCE_DIR: &str = "/var/tmp/git-fastclone/reference";

const MANIFEST_SUFFIX: &str = ":submodules.txt";

/// Manages all filesystem paths for the reference directory layout
#[derive(Debug, Clone)]
pub struct CachePaths {
    root: PathBuf,
}

impl CachePaths {
    /// Creates a new CachePaths with the specified root directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root reference directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory if it does not exist yet.
    ///
    /// Fails with `AlreadyExists` when the root is a file.
    pub fn ensure_root(&self) -> io::Result<()> {
        if self.root.exists() {
            if !self.root.is_dir() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} is not a directory", self.root.display()),
                ));
            }
            return Ok(());
        }
        std::fs::create_dir_all(&self.root)
    }

    /// Returns the mirror directory for a repository: `{root}/{key}`
    pub fn mirror_dir(&self, key: &MirrorKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    /// Returns the submodule manifest path: `{root}/{key}:submodules.txt`
    pub fn manifest_path(&self, key: &MirrorKey) -> PathBuf {
        self.root.join(format!("{}{}", key.as_str(), MANIFEST_SUFFIX))
    }
}

impl Default for CachePaths {
    fn default() -> Self {
        Self::new(DEFAULT_REFERENCE_DIR)
    }
}
