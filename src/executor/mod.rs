//! Host command execution.
//!
//! Steps never spawn processes themselves. They describe a command as a
//! [`CommandSpec`] and hand it to a [`CommandExecutor`], which lets tests
//! substitute a recorder for the real system.

mod pipe;
mod real;

use std::fmt;
use std::process::ExitStatus;

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};

use crate::error::ProvisionError;
use crate::privilege::PrivilegeMethod;

pub use real::RealCommandExecutor;

/// How much of a child's output reaches the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Verbosity {
    /// Child output is logged at DEBUG level only.
    #[default]
    Quiet,
    /// Child stdout is logged at INFO, stderr at WARN.
    Verbose,
}

impl Verbosity {
    /// Maps the boolean-like `VERBOSE` toggle to a verbosity.
    pub fn from_flag(verbose: bool) -> Self {
        if verbose { Self::Verbose } else { Self::Quiet }
    }
}

/// A program invocation: what to run, with which arguments and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name, resolved against the executor's search path
    pub command: String,
    pub args: Vec<String>,
    /// Extra variables layered over the inherited environment
    pub env: Vec<(String, String)>,
    /// Wrapper (`sudo`, `doas`) the program runs under
    pub privilege: Option<PrivilegeMethod>,
}

impl CommandSpec {
    #[must_use]
    pub fn new<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: Vec::new(),
            privilege: None,
        }
    }

    #[must_use]
    pub fn with_privilege(self, privilege: Option<PrivilegeMethod>) -> Self {
        Self { privilege, ..self }
    }

    #[must_use]
    pub fn with_env(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_envs([(key, value)])
    }

    /// Appends variables, keeping their order.
    #[must_use]
    pub fn with_envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in vars {
            self.env.push((key.into(), value.into()));
        }
        self
    }
}

/// Renders the command line as a user would type it. Arguments that are
/// empty or contain whitespace or quotes are single-quoted.
impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(method) = self.privilege {
            write!(f, "{} ", method)?;
        }
        f.write_str(&self.command)?;
        for arg in &self.args {
            let needs_quotes = arg.is_empty()
                || arg
                    .chars()
                    .any(|c| c.is_whitespace() || c == '\'' || c == '"');
            if needs_quotes {
                write!(f, " '{}'", arg.replace('\'', r"'\''"))?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Outcome of one [`CommandExecutor::execute`] call.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionResult {
    /// `None` when nothing was spawned (dry run)
    pub status: Option<ExitStatus>,
}

impl ExecutionResult {
    /// A command that did not run counts as successful.
    pub fn success(&self) -> bool {
        match self.status {
            Some(status) => status.success(),
            None => true,
        }
    }

    pub fn code(&self) -> Option<i32> {
        self.status?.code()
    }
}

/// The capability to run host commands.
///
/// `Send + Sync` because the real executor reads child output on helper
/// threads.
pub trait CommandExecutor: Send + Sync {
    /// Runs `spec` to completion. `Err` means the command could not run at
    /// all; a non-zero exit is reported through the returned status.
    fn execute(&self, spec: &CommandSpec) -> Result<ExecutionResult>;

    /// Finds `program` in the effective search path.
    ///
    /// The effective search path is every directory registered with
    /// [`prepend_path`](Self::prepend_path), followed by the inherited `PATH`.
    fn locate(&self, program: &str) -> Option<Utf8PathBuf>;

    /// Adds `dir` to the front of the effective search path.
    ///
    /// Affects later [`locate`](Self::locate) calls and the `PATH` seen by
    /// every subsequently spawned child.
    fn prepend_path(&self, dir: &Utf8Path);
}

/// Runs `spec` and converts a non-zero exit into an error.
pub fn run_checked(executor: &dyn CommandExecutor, spec: &CommandSpec) -> Result<()> {
    let result = executor.execute(spec)?;
    if result.success() {
        return Ok(());
    }
    let status = match result.code() {
        Some(code) => format!("exit status: {}", code),
        None => "terminated by signal".to_string(),
    };
    Err(ProvisionError::Execution {
        command: spec.to_string(),
        status,
    }
    .into())
}

/// Runs a read-only query and reports whether it exited successfully.
///
/// Errors (for example a missing program) count as an unsuccessful query.
pub fn query(executor: &dyn CommandExecutor, spec: &CommandSpec) -> bool {
    match executor.execute(spec) {
        Ok(result) => result.success(),
        Err(e) => {
            tracing::debug!("query `{}` failed: {:#}", spec, e);
            false
        }
    }
}
