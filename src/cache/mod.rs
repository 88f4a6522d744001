//! Git + reference mirror management

mod git;
mod manifest;
mod paths;
mod store;

pub use git::{Git, GitCli, GitError, validate_revision};
pub use paths::{CachePaths, DEFAULT_REFERENCE_DIR};
pub use store::{CacheError, INTERRUPTED_EXIT_CODE, ReferenceStore};
