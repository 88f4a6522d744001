//! Command line and resolved configuration.

use std::path::{Path, PathBuf};

use clap::Parser;

use crate::cache::DEFAULT_REFERENCE_DIR;
use crate::clone::CloneError;
use crate::types::RepoUrl;

#[derive(Parser, Debug)]
#[command(
    name = "git-fastclone",
    version,
    about = "Clone git repositories and their submodules against local reference mirrors"
)]
pub struct Cli {
    /// Branch, tag or commit to check out after cloning
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Neither record nor prefetch submodule mirrors
    #[arg(long)]
    pub no_prefetch: bool,

    /// Log every git command
    #[arg(short, long)]
    pub verbose: bool,

    /// Directory holding the reference mirrors
    #[arg(long, env = "REFERENCE_REPO_DIR", default_value = DEFAULT_REFERENCE_DIR)]
    pub reference_dir: PathBuf,

    /// Git binary to run
    #[arg(long = "git", env = "GIT_FASTCLONE_GIT", default_value = "git")]
    pub git_path: String,

    /// Repository to clone
    pub url: RepoUrl,

    /// Destination directory (defaults to the repository name)
    pub path: Option<PathBuf>,
}

impl Cli {
    /// Where the checkout goes, relative paths resolved against `cwd`.
    pub fn destination(&self, cwd: &Path) -> Result<PathBuf, CloneError> {
        match &self.path {
            Some(path) => Ok(cwd.join(path)),
            None => self
                .url
                .checkout_name()
                .map(|name| cwd.join(name))
                .ok_or_else(|| CloneError::NoCheckoutName(self.url.clone())),
        }
    }

    /// The log filter used when `RUST_LOG` is not set.
    pub fn default_log_filter(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }
}

/// Settings shared by the whole run.
#[derive(Debug, Clone)]
pub struct Config {
    pub reference_dir: PathBuf,
    pub git_path: String,
    pub prefetch_submodules: bool,
}

impl From<&Cli> for Config {
    fn from(cli: &Cli) -> Self {
        Self {
            reference_dir: cli.reference_dir.clone(),
            git_path: cli.git_path.clone(),
            prefetch_submodules: !cli.no_prefetch,
        }
    }
}
