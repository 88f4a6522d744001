//! Submodule graph walker.
//!
//! Starting from a fresh checkout, `update_submodules` registers the declared
//! submodules, refreshes the mirror of each one and updates its working tree
//! against that mirror, then descends into it. Every submodule of a directory
//! gets its own thread; a directory returns only once its whole subtree is done.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::thread;

use regex_lite::Regex;

use crate::cache::{CacheError, ReferenceStore};
use crate::types::RepoUrl;

/// Prefix of the `git submodule init` lines that describe a submodule.
const SUBMODULE_LINE_PREFIX: &str = "Submodule ";

static PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'([^']*)'$").expect("path regex must compile"));
static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([^)]*)\)").expect("url regex must compile"));

/// A submodule declared by a checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submodule {
    /// Location relative to the parent checkout.
    pub path: PathBuf,
    pub url: RepoUrl,
}

/// Extract the submodules listed in `git submodule init` output.
///
/// Lines that do not start with `Submodule ` are progress chatter and are
/// skipped. A `Submodule ` line without a quoted path at its end or without a
/// parenthesized URL is an error.
pub fn parse_init_output(output: &str) -> Result<Vec<Submodule>, CacheError> {
    let mut submodules = Vec::new();

    for line in output.lines() {
        let line = line.trim();
        if !line.starts_with(SUBMODULE_LINE_PREFIX) {
            if !line.is_empty() {
                log::debug!("Ignoring submodule init line: {}", line);
            }
            continue;
        }

        let malformed = || CacheError::MalformedSubmoduleLine(line.to_string());
        let path = PATH_RE
            .captures(line)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .filter(|p| !p.is_empty())
            .ok_or_else(malformed)?;
        let url = URL_RE
            .captures(line)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<RepoUrl>().ok())
            .ok_or_else(malformed)?;

        submodules.push(Submodule {
            path: PathBuf::from(path),
            url,
        });
    }

    Ok(submodules)
}

/// Check out every submodule of `checkout`, recursively, against reference mirrors.
///
/// `url` is the repository `checkout` was cloned from; its manifest is
/// rewritten with the submodule URLs found, if any. A checkout without `.gitmodules`
/// ends the recursion without running anything.
pub fn update_submodules(
    store: &Arc<ReferenceStore>,
    checkout: &Path,
    url: &RepoUrl,
) -> Result<(), CacheError> {
    if !checkout.join(".gitmodules").exists() {
        return Ok(());
    }

    store.supervisor().checkpoint()?;
    let output = store.git().submodule_init(checkout)?;
    let submodules = parse_init_output(&output)?;
    log::debug!(
        "Found {} submodule(s) in {}",
        submodules.len(),
        checkout.display()
    );

    if store.prefetch_enabled() && !submodules.is_empty() {
        let urls: Vec<RepoUrl> = submodules.iter().map(|s| s.url.clone()).collect();
        store.write_manifest(url, &urls)?;
    }

    let results: Vec<Result<(), CacheError>> = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(submodules.len());
        for submodule in &submodules {
            let handle = thread::Builder::new()
                .name(format!("submodule {}", submodule.path.display()))
                .spawn_scoped(scope, move || {
                    let result = update_one(store, checkout, submodule);
                    if matches!(&result, Err(err) if !err.is_cancelled()) {
                        store.supervisor().cancel();
                    }
                    result
                });
            match handle {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    store.supervisor().cancel();
                    handles.clear();
                    return vec![Err(CacheError::Io(err))];
                }
            }
        }

        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(result) => result,
                Err(payload) => std::panic::resume_unwind(payload),
            })
            .collect()
    });

    first_failure(results)
}

fn update_one(
    store: &Arc<ReferenceStore>,
    checkout: &Path,
    submodule: &Submodule,
) -> Result<(), CacheError> {
    let mirror = store.ensure_fresh(&submodule.url)?;

    store.supervisor().checkpoint()?;
    log::info!(
        "Updating submodule {} in {}",
        submodule.path.display(),
        checkout.display()
    );
    store
        .git()
        .submodule_update(checkout, &mirror, &submodule.path)?;

    update_submodules(store, &checkout.join(&submodule.path), &submodule.url)
}

/// The first real failure, falling back to `Cancelled` when that is all there is.
fn first_failure(results: Vec<Result<(), CacheError>>) -> Result<(), CacheError> {
    let mut cancelled = None;
    for result in results {
        match result {
            Ok(()) => {}
            Err(err) if err.is_cancelled() => cancelled = Some(err),
            Err(err) => return Err(err),
        }
    }
    match cancelled {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
