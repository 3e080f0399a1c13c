//! Idempotent provisioning steps.
//!
//! A step checks whether its goal state already holds and only acts when it
//! does not. The contract lives in the provided [`ProvisioningStep::run`]:
//!
//! 1. `is_satisfied()` true → [`StepResult::AlreadySatisfied`], nothing runs
//! 2. platform unsupported → fatal abort or [`StepResult::SkippedUnsupported`]
//! 3. otherwise `apply()`; an error becomes [`StepResult::Failed`] unless it
//!    is a fatal [`ProvisionError`], which aborts the run
//!
//! Adding a step kind means implementing the trait and listing the step in
//! [`Manifest::steps`](crate::config::Manifest::steps).

mod dotfile;
mod package_manager;
mod packages;
mod plugin;
mod shell_framework;
mod toolchain;

use std::borrow::Cow;
use std::fmt;
use std::fs;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use tracing::{debug, warn};

pub use dotfile::DotfileStep;
pub use package_manager::{BREW, PackageManagerStep, default_candidate_dirs};
pub use packages::PackagesStep;
pub use plugin::PluginStep;
pub use shell_framework::ShellFrameworkStep;
pub use toolchain::ToolchainStep;

use crate::config::Settings;
use crate::error::ProvisionError;
use crate::executor::{CommandExecutor, CommandSpec, run_checked};
use crate::platform::Platform;
use crate::reporter::Reporter;

/// Outcome of running one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    /// The goal state already held; nothing was done.
    AlreadySatisfied,
    /// The step acted and succeeded.
    Applied,
    /// The step does not run on this platform.
    SkippedUnsupported,
    /// The step acted and failed; the run continues.
    Failed(String),
}

impl StepResult {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadySatisfied => f.write_str("already satisfied"),
            Self::Applied => f.write_str("applied"),
            Self::SkippedUnsupported => f.write_str("skipped (unsupported platform)"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Everything a step may read or act through.
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    pub settings: &'a Settings,
    pub executor: &'a dyn CommandExecutor,
    pub reporter: &'a dyn Reporter,
}

impl<'a> StepContext<'a> {
    pub fn new(
        settings: &'a Settings,
        executor: &'a dyn CommandExecutor,
        reporter: &'a dyn Reporter,
    ) -> Self {
        Self {
            settings,
            executor,
            reporter,
        }
    }

    pub fn platform(&self) -> Platform {
        self.settings.platform
    }
}

/// An idempotent "ensure this holds" unit of work.
///
/// `apply` must be safe to call when `is_satisfied` already returns true.
pub trait ProvisioningStep {
    /// Name used in reports and logs.
    fn name(&self) -> Cow<'_, str>;

    /// Returns true if the step can act on `platform`.
    fn supports(&self, _platform: Platform) -> bool {
        true
    }

    /// Returns true if running on an unsupported platform aborts the run.
    fn fatal_if_unsupported(&self) -> bool {
        false
    }

    /// Checks the current system state. Must not mutate it.
    fn is_satisfied(&self, ctx: &StepContext<'_>) -> Result<bool>;

    /// Brings the system into the goal state.
    fn apply(&self, ctx: &StepContext<'_>) -> Result<()>;

    /// Runs the step under the idempotence contract.
    ///
    /// Returns `Err` only for fatal conditions; every other failure is
    /// reported as [`StepResult::Failed`].
    fn run(&self, ctx: &StepContext<'_>) -> Result<StepResult, ProvisionError> {
        let name = self.name();

        match self.is_satisfied(ctx) {
            Ok(true) => {
                debug!("{}: already satisfied", name);
                return Ok(StepResult::AlreadySatisfied);
            }
            Ok(false) => {}
            Err(e) => warn!("{}: state check failed, assuming not satisfied: {:#}", name, e),
        }

        let platform = ctx.platform();
        if !self.supports(platform) {
            if self.fatal_if_unsupported() {
                return Err(ProvisionError::UnsupportedPlatform {
                    step: name.into_owned(),
                    platform,
                });
            }
            warn!("{}: not supported on {}, skipping", name, platform);
            return Ok(StepResult::SkippedUnsupported);
        }

        match self.apply(ctx) {
            Ok(()) => Ok(StepResult::Applied),
            Err(e) => {
                let fatal = e
                    .downcast_ref::<ProvisionError>()
                    .is_some_and(ProvisionError::is_fatal);
                if fatal {
                    let reason = format!("{:#}", e);
                    return Err(e
                        .downcast::<ProvisionError>()
                        .unwrap_or_else(|_| ProvisionError::PackageManagerUnavailable(reason)));
                }
                Ok(StepResult::Failed(format!("{:#}", e)))
            }
        }
    }
}

/// A downloaded installer script in the temp directory, deleted on drop.
///
/// Dry runs never create the file, so nothing is deleted.
pub(crate) struct ScriptFile {
    path: Utf8PathBuf,
    dry_run: bool,
}

impl ScriptFile {
    /// Picks a fresh `envstrap-<uuid>.sh` path without creating it.
    pub(crate) fn reserve(dry_run: bool) -> Result<Self> {
        let temp = Utf8PathBuf::from_path_buf(std::env::temp_dir())
            .map_err(|p| anyhow::anyhow!("temp directory is not valid UTF-8: {}", p.display()))?;
        Ok(Self::at(temp.join(format!("envstrap-{}.sh", uuid::Uuid::new_v4())), dry_run))
    }

    fn at(path: Utf8PathBuf, dry_run: bool) -> Self {
        Self { path, dry_run }
    }

    pub(crate) fn path(&self) -> &Utf8PathBuf {
        &self.path
    }
}

impl Drop for ScriptFile {
    fn drop(&mut self) {
        if self.dry_run {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() == std::io::ErrorKind::NotFound {
                debug!("{} was never written", self.path);
            } else {
                tracing::error!(path = %self.path, "could not delete installer script: {}", e);
            }
        }
    }
}

/// A vendor installer script fetched over HTTPS and run non-interactively.
pub(crate) struct RemoteInstaller<'a> {
    pub label: &'a str,
    pub url: &'a str,
    pub interpreter: &'a str,
    pub args: &'a [&'a str],
    pub env: &'a [(&'a str, &'a str)],
}

impl RemoteInstaller<'_> {
    /// Downloads the script to a temp file with `curl` and runs it.
    pub(crate) fn run(&self, ctx: &StepContext<'_>) -> Result<()> {
        let script_file = ScriptFile::reserve(ctx.settings.dry_run)?;
        let script = script_file.path();

        let download = CommandSpec::new("curl", ["-fsSL", self.url, "-o", script.as_str()]);
        run_checked(ctx.executor, &download)
            .with_context(|| format!("failed to download {} installer from {}", self.label, self.url))?;

        let mut args = vec![script.to_string()];
        args.extend(self.args.iter().map(|a| a.to_string()));
        let install = CommandSpec::new(self.interpreter, args).with_envs(self.env.iter().copied());
        run_checked(ctx.executor, &install)
            .with_context(|| format!("{} installer failed", self.label))
    }
}
