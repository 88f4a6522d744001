//! Subprocess execution.
//!
//! Commands are always spawned from an argv list, never through a shell.
//! A failing command turns into an [`ExecError`] that carries the exit code
//! the process should terminate with.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

/// Exit code used when a command did not produce one of its own.
pub const FALLBACK_EXIT_CODE: i32 = 1;

/// Errors returned by [`run`].
#[derive(Error, Debug)]
pub enum ExecError {
    /// No program was given.
    #[error("refusing to run an empty command")]
    Empty,
    /// A lone command string was given, which only makes sense to a shell.
    #[error("refusing to run {0:?} through a shell; pass the program and its arguments separately")]
    ShellShaped(String),
    /// The program could not be started.
    #[error("failed to start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    /// The program exited with a nonzero status.
    #[error("{command} exited with code {code}\n{output}")]
    Failed {
        command: String,
        code: i32,
        output: String,
    },
    /// The program was killed or otherwise ended without an exit code.
    #[error("{command} terminated abnormally ({status})\n{output}")]
    Terminated {
        command: String,
        status: String,
        output: String,
    },
}

impl ExecError {
    /// Exit code the process should use for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExecError::Failed { code, .. } => *code,
            _ => FALLBACK_EXIT_CODE,
        }
    }
}

/// A command line plus the options it runs with.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    argv: Vec<OsString>,
    cwd: Option<PathBuf>,
    envs: Vec<(OsString, OsString)>,
}

impl Invocation {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            argv: vec![program.as_ref().to_os_string()],
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.argv.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.argv
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Run the command from `dir`.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    pub fn argv(&self) -> &[OsString] {
        &self.argv
    }

    /// Reject argv shapes that a process spawner would hand to a shell.
    ///
    /// One textual element and nothing else is a whole command line in
    /// disguise, so it is refused even though `Command` itself would not
    /// involve a shell.
    fn check_shell_safe(&self) -> Result<(), ExecError> {
        match self.argv.as_slice() {
            [] => Err(ExecError::Empty),
            [only] => Err(ExecError::ShellShaped(only.to_string_lossy().into_owned())),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Invocation {
    /// Renders the argv as a fully double-quoted line that a shell would run
    /// the same way. Environment and working directory are not included.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for arg in &self.argv {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            let escaped = arg
                .to_string_lossy()
                .replace('\\', "\\\\")
                .replace('"', "\\\"");
            write!(f, "\"{}\"", escaped)?;
        }
        Ok(())
    }
}

/// Run a command to completion and return its stdout followed by its stderr.
///
/// git prints some listings, such as `git submodule init`, on stderr only, so
/// both streams make up the output. stdin is closed. On a nonzero exit the
/// error carries the exit code along with the same combined output.
pub fn run(invocation: &Invocation) -> Result<String, ExecError> {
    invocation.check_shell_safe()?;

    let rendered = invocation.to_string();
    if let Some(cwd) = &invocation.cwd {
        log::debug!("Running {} in {}", rendered, cwd.display());
    } else {
        log::debug!("Running {}", rendered);
    }

    let (program, args) = invocation
        .argv
        .split_first()
        .ok_or(ExecError::Empty)?;

    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.stdin(Stdio::null());
    if let Some(cwd) = &invocation.cwd {
        cmd.current_dir(cwd);
    }
    for (key, value) in &invocation.envs {
        cmd.env(key, value);
    }

    let output = cmd.output().map_err(|source| ExecError::Spawn {
        command: rendered.clone(),
        source,
    })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    if output.status.success() {
        return Ok(combined);
    }

    match output.status.code() {
        Some(code) => {
            log::debug!("Return code was {}", code);
            Err(ExecError::Failed {
                command: rendered,
                code,
                output: combined,
            })
        }
        None => Err(ExecError::Terminated {
            command: rendered,
            status: output.status.to_string(),
            output: combined,
        }),
    }
}
