//! [`RealCommandExecutor`]: spawns host processes and streams their output
//! into the log while they run.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};

use super::pipe::{Stream, forward_to_log, panic_message};
use super::{CommandExecutor, CommandSpec, ExecutionResult, Verbosity};
use crate::error::ProvisionError;

/// Runs commands on the host.
///
/// Programs are resolved against a private search path: directories added
/// with [`prepend_path`](CommandExecutor::prepend_path) come first, then the
/// inherited `PATH`. Children receive that same value as `PATH`. In dry-run
/// mode nothing is resolved or spawned.
pub struct RealCommandExecutor {
    pub dry_run: bool,
    pub verbosity: Verbosity,
    search_prefix: Mutex<Vec<Utf8PathBuf>>,
}

impl RealCommandExecutor {
    pub fn new(dry_run: bool, verbosity: Verbosity) -> Self {
        Self {
            dry_run,
            verbosity,
            search_prefix: Mutex::new(Vec::new()),
        }
    }

    fn search_path(&self) -> OsString {
        let inherited = std::env::var_os("PATH").unwrap_or_default();
        let prefix = self
            .search_prefix
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if prefix.is_empty() {
            return inherited;
        }
        let dirs: Vec<PathBuf> = prefix
            .iter()
            .map(|dir| dir.as_std_path().to_path_buf())
            .chain(std::env::split_paths(&inherited))
            .collect();
        std::env::join_paths(dirs).unwrap_or(inherited)
    }

    fn resolve(&self, program: &str) -> Result<PathBuf, ProvisionError> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        which::which_in(program, Some(self.search_path()), cwd).map_err(|_| {
            ProvisionError::CommandNotFound {
                command: program.to_string(),
            }
        })
    }

    fn build_command(&self, spec: &CommandSpec) -> Result<Command, ProvisionError> {
        let program = self.resolve(&spec.command)?;
        tracing::trace!("resolved {} to {}", spec.command, program.display());

        let mut command = match spec.privilege {
            Some(method) => {
                let mut wrapped = Command::new(self.resolve(method.program())?);
                wrapped.arg(program);
                wrapped
            }
            None => Command::new(program),
        };
        command
            .args(&spec.args)
            .env("PATH", self.search_path())
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        Ok(command)
    }

    /// Spawns one log-forwarding thread per captured stream.
    fn spawn_readers(&self, child: &mut Child) -> Result<Vec<(Stream, JoinHandle<()>)>, String> {
        let verbosity = self.verbosity;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let mut readers = Vec::with_capacity(2);
        match thread::Builder::new()
            .name("stdout-reader".into())
            .spawn(move || forward_to_log(stdout, Stream::Stdout, verbosity))
        {
            Ok(out) => readers.push((Stream::Stdout, out)),
            Err(e) => {
                abandon(child, readers);
                return Err(format!("failed to spawn stdout reader: {}", e));
            }
        }

        match thread::Builder::new()
            .name("stderr-reader".into())
            .spawn(move || forward_to_log(stderr, Stream::Stderr, verbosity))
        {
            Ok(err) => readers.push((Stream::Stderr, err)),
            Err(e) => {
                abandon(child, readers);
                return Err(format!("failed to spawn stderr reader: {}", e));
            }
        }
        Ok(readers)
    }
}

/// Kills `child` and reaps it along with its reader threads.
fn abandon(child: &mut Child, readers: Vec<(Stream, JoinHandle<()>)>) {
    let pid = child.id();
    if let Err(e) = child.kill() {
        tracing::debug!(pid, "kill failed, child probably exited already: {}", e);
    }
    if let Err(e) = child.wait() {
        tracing::warn!(pid, "could not reap child: {}", e);
    }
    for (stream, handle) in readers {
        if let Err(payload) = handle.join() {
            tracing::warn!(%stream, "reader panicked: {}", panic_message(&*payload));
        }
    }
}

/// Waits for `child` and then for its readers. A panicked reader fails the
/// command even when the child exited cleanly.
fn finish(child: &mut Child, readers: Vec<(Stream, JoinHandle<()>)>) -> Result<ExitStatus, String> {
    let status = match child.wait() {
        Ok(status) => status,
        Err(e) => {
            abandon(child, readers);
            return Err(format!("failed to wait for command: {}", e));
        }
    };

    let panics: Vec<String> = readers
        .into_iter()
        .filter_map(|(stream, handle)| {
            handle.join().err().map(|payload| {
                let message = panic_message(&*payload).to_string();
                tracing::error!(%stream, panic = %message, "reader panicked");
                format!("{}: {}", stream, message)
            })
        })
        .collect();
    if panics.is_empty() {
        Ok(status)
    } else {
        Err(format!("output reader panicked ({})", panics.join(", ")))
    }
}

impl CommandExecutor for RealCommandExecutor {
    fn execute(&self, spec: &CommandSpec) -> Result<ExecutionResult> {
        if self.dry_run {
            tracing::info!("dry run: {}", spec);
            return Ok(ExecutionResult { status: None });
        }

        let mut child = self
            .build_command(spec)?
            .spawn()
            .with_context(|| format!("failed to spawn `{}`", spec))?;
        tracing::debug!(pid = child.id(), "started `{}`", spec);

        let failure = |status: String| ProvisionError::Execution {
            command: spec.to_string(),
            status,
        };
        let readers = self.spawn_readers(&mut child).map_err(failure)?;
        let status = finish(&mut child, readers).map_err(failure)?;

        tracing::debug!("`{}` finished: {}", spec, status);
        Ok(ExecutionResult {
            status: Some(status),
        })
    }

    fn locate(&self, program: &str) -> Option<Utf8PathBuf> {
        let path = self.resolve(program).ok()?;
        Utf8PathBuf::from_path_buf(path).ok()
    }

    fn prepend_path(&self, dir: &Utf8Path) {
        let mut prefix = self
            .search_prefix
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if prefix.iter().all(|existing| existing != dir) {
            tracing::debug!("prepending {} to PATH", dir);
            prefix.insert(0, dir.to_owned());
        }
    }
}
