//! Submodule manifests.
//!
//! A manifest records, for one mirror, the URLs of the submodules its
//! repository declared the last time it was checked out. The next run reads
//! it to warm those mirrors before they are needed.

use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::RepoUrl;

static WRITE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Replace the manifest at `path` with `urls`, one per line.
///
/// The content goes to a temporary sibling first and is renamed into place.
pub fn write(path: &Path, urls: &[RepoUrl]) -> io::Result<()> {
    let counter = WRITE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(format!(".tmp.{}.{}", std::process::id(), counter));
    let tmp_path = Path::new(&tmp_name);

    let result = (|| {
        let mut file = std::fs::File::create(tmp_path)?;
        for url in urls {
            writeln!(file, "{}", url)?;
        }
        file.sync_all()?;
        std::fs::rename(tmp_path, path)
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(tmp_path);
    }
    result
}

/// Read the manifest at `path`.
///
/// A missing manifest reads as empty. Invalid UTF-8 is replaced rather than
/// rejected. Blank lines are skipped, and so are lines that are not usable URLs.
pub fn read(path: &Path) -> io::Result<Vec<RepoUrl>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };
    let contents = String::from_utf8_lossy(&bytes);

    let mut urls = Vec::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.parse::<RepoUrl>() {
            Ok(url) => urls.push(url),
            Err(err) => log::warn!(
                "Ignoring manifest entry {:?} in {}: {}",
                line,
                path.display(),
                err
            ),
        }
    }
    Ok(urls)
}
