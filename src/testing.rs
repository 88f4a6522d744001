//! In-memory [`Git`] used by unit tests.
//!
//! `FakeGit` records every call, materializes the directories a real git
//! would create, and serves `git submodule init` output from a configured
//! repository graph.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use crate::cache::{Git, GitError};
use crate::exec::ExecError;
use crate::types::RepoUrl;

pub fn url(s: &str) -> RepoUrl {
    s.parse().unwrap()
}

/// A recorded git call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    CloneMirror(RepoUrl, PathBuf),
    RemoteUpdate(PathBuf),
    CloneWithReference(RepoUrl, PathBuf, PathBuf),
    Checkout(PathBuf, String),
    SubmoduleInit(PathBuf),
    SubmoduleUpdate(PathBuf, PathBuf, PathBuf),
}

impl Op {
    pub fn is_clone_mirror(&self) -> bool {
        matches!(self, Op::CloneMirror(..))
    }

    pub fn is_remote_update(&self) -> bool {
        matches!(self, Op::RemoteUpdate(..))
    }

    pub fn is_submodule_update(&self) -> bool {
        matches!(self, Op::SubmoduleUpdate(..))
    }

    pub fn is_submodule_init(&self) -> bool {
        matches!(self, Op::SubmoduleInit(..))
    }
}

type Matcher = Box<dyn Fn(&Op) -> bool + Send + Sync>;

struct Failure {
    matches: Matcher,
    code: i32,
    remaining: Option<usize>,
}

#[derive(Default)]
pub struct FakeGit {
    ops: Mutex<Vec<Op>>,
    repos: HashMap<RepoUrl, Vec<(String, RepoUrl)>>,
    init_output: HashMap<RepoUrl, String>,
    checkouts: Mutex<HashMap<PathBuf, RepoUrl>>,
    failures: Mutex<Vec<Failure>>,
    delay: Option<Duration>,
}

impl FakeGit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the submodules (`path`, `url`) of the repository at `repo`.
    pub fn with_repo(mut self, repo: &str, submodules: &[(&str, &str)]) -> Self {
        self.repos.insert(
            url(repo),
            submodules
                .iter()
                .map(|(path, sub)| (path.to_string(), url(sub)))
                .collect(),
        );
        self
    }

    /// Serve `output` verbatim from `submodule init` for `repo`.
    pub fn with_init_output(mut self, repo: &str, output: &str) -> Self {
        self.init_output.insert(url(repo), output.to_string());
        self
    }

    /// Sleep inside mirror operations to widen race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every call matching `matches` with exit code `code`.
    pub fn fail_when(self, code: i32, matches: impl Fn(&Op) -> bool + Send + Sync + 'static) -> Self {
        self.push_failure(code, None, Box::new(matches))
    }

    pub fn fail_remote_update_once(self, code: i32) -> Self {
        self.push_failure(code, Some(1), Box::new(Op::is_remote_update))
    }

    pub fn fail_clone_of(self, repo: &RepoUrl, code: i32) -> Self {
        let repo = repo.clone();
        self.fail_when(code, move |op| {
            matches!(op, Op::CloneMirror(u, _) | Op::CloneWithReference(u, _, _) if *u == repo)
        })
    }

    fn push_failure(self, code: i32, remaining: Option<usize>, matches: Matcher) -> Self {
        self.failures.lock().unwrap().push(Failure {
            matches,
            code,
            remaining,
        });
        self
    }

    pub fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Op) -> bool) -> usize {
        self.ops.lock().unwrap().iter().filter(|op| predicate(op)).count()
    }

    fn record(&self, op: Op) -> Result<(), GitError> {
        let mut failures = self.failures.lock().unwrap();
        let failure = failures.iter_mut().find(|f| {
            f.remaining != Some(0) && (f.matches)(&op)
        });
        let result = match failure {
            Some(failure) => {
                if let Some(remaining) = failure.remaining.as_mut() {
                    *remaining -= 1;
                }
                Err(GitError::Exec(ExecError::Failed {
                    command: format!("{:?}", op),
                    code: failure.code,
                    output: "fatal: injected failure\n".to_string(),
                }))
            }
            None => Ok(()),
        };
        drop(failures);

        self.ops.lock().unwrap().push(op);
        result
    }

    fn pause(&self) {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
    }

    fn materialize(&self, dir: &Path, repo: &RepoUrl) -> Result<(), GitError> {
        std::fs::create_dir_all(dir)?;
        if self.repos.get(repo).is_some_and(|subs| !subs.is_empty())
            || self.init_output.contains_key(repo)
        {
            std::fs::write(dir.join(".gitmodules"), "")?;
        }
        self.checkouts
            .lock()
            .unwrap()
            .insert(dir.to_path_buf(), repo.clone());
        Ok(())
    }

    fn checkout_url(&self, dir: &Path) -> Option<RepoUrl> {
        self.checkouts.lock().unwrap().get(dir).cloned()
    }
}

impl Git for FakeGit {
    fn clone_mirror(&self, url: &RepoUrl, dest: &Path) -> Result<(), GitError> {
        self.pause();
        self.record(Op::CloneMirror(url.clone(), dest.to_path_buf()))?;
        std::fs::create_dir_all(dest)?;
        Ok(())
    }

    fn remote_update(&self, mirror: &Path) -> Result<(), GitError> {
        self.pause();
        self.record(Op::RemoteUpdate(mirror.to_path_buf()))
    }

    fn clone_with_reference(&self, url: &RepoUrl, mirror: &Path, dest: &Path) -> Result<(), GitError> {
        self.record(Op::CloneWithReference(
            url.clone(),
            mirror.to_path_buf(),
            dest.to_path_buf(),
        ))?;
        self.materialize(dest, url)
    }

    fn checkout(&self, dir: &Path, rev: &str) -> Result<(), GitError> {
        self.record(Op::Checkout(dir.to_path_buf(), rev.to_string()))
    }

    fn submodule_init(&self, dir: &Path) -> Result<String, GitError> {
        self.record(Op::SubmoduleInit(dir.to_path_buf()))?;

        let Some(repo) = self.checkout_url(dir) else {
            return Ok(String::new());
        };
        if let Some(output) = self.init_output.get(&repo) {
            return Ok(output.clone());
        }

        let mut output = String::new();
        for (path, sub) in self.repos.get(&repo).into_iter().flatten() {
            output.push_str(&format!(
                "Submodule '{path}' ({sub}) registered for path '{path}'\n"
            ));
        }
        Ok(output)
    }

    fn submodule_update(&self, dir: &Path, mirror: &Path, path: &Path) -> Result<(), GitError> {
        self.record(Op::SubmoduleUpdate(
            dir.to_path_buf(),
            mirror.to_path_buf(),
            path.to_path_buf(),
        ))?;

        let sub = self.checkout_url(dir).and_then(|repo| {
            self.repos.get(&repo).and_then(|subs| {
                subs.iter()
                    .find(|(p, _)| Path::new(p) == path)
                    .map(|(_, u)| u.clone())
            })
        });
        match sub {
            Some(sub) => self.materialize(&dir.join(path), &sub),
            None => {
                std::fs::create_dir_all(dir.join(path))?;
                Ok(())
            }
        }
    }
}
