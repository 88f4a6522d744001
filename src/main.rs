pub mod cache;
pub mod clone;
pub mod config;
pub mod exec;
pub mod submodules;
pub mod supervisor;
pub mod types;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use clap::Parser;

use crate::cache::{CacheError, CachePaths, Git, GitCli, ReferenceStore};
use crate::clone::{CloneError, FastClone};
use crate::config::{Cli, Config};
use crate::supervisor::Supervisor;

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(cli.default_log_filter()),
    )
    .init();

    if let Err(e) = run(&cli) {
        log::error!("{}", e);
        std::process::exit(e.exit_code());
    }
}

fn run(cli: &Cli) -> Result<(), CloneError> {
    let config = Config::from(cli);
    let dest = cli.destination(&std::env::current_dir()?)?;

    let supervisor = Supervisor::new();
    let interrupt = supervisor.clone();
    if let Err(e) = ctrlc::set_handler(move || interrupt.report(CacheError::Interrupted)) {
        log::warn!("Failed to install Ctrl-C handler: {}", e);
    }

    let git: Arc<dyn Git> = Arc::new(GitCli::with_path(&config.git_path));
    let store = ReferenceStore::open(CachePaths::new(&config.reference_dir), git, supervisor)?
        .with_prefetch(config.prefetch_submodules);

    FastClone::new(Arc::new(store)).run(&cli.url, cli.branch.as_deref(), &dest)?;
    Ok(())
}
