//! Homebrew bootstrap.
//!
//! Every later package step shells out to `brew`, so failing to make it
//! reachable is fatal for the run.

use std::borrow::Cow;

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use tracing::{info, warn};

use super::{ProvisioningStep, RemoteInstaller, StepContext};
use crate::error::ProvisionError;
use crate::platform::Platform;

/// Program name of the third-party package manager.
pub const BREW: &str = "brew";

/// Directories a Homebrew install places `brew` in, per platform.
pub fn default_candidate_dirs(platform: Platform, home: &Utf8Path) -> Vec<Utf8PathBuf> {
    match platform {
        Platform::MacOs => vec!["/opt/homebrew/bin".into(), "/usr/local/bin".into()],
        Platform::Debian | Platform::RedHat => vec![
            "/home/linuxbrew/.linuxbrew/bin".into(),
            home.join(".linuxbrew").join("bin"),
        ],
        Platform::Unknown => Vec::new(),
    }
}

/// Ensures `brew` is reachable, running the official installer if needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageManagerStep {
    installer_url: String,
    candidates: Option<Vec<Utf8PathBuf>>,
}

impl PackageManagerStep {
    pub fn new(installer_url: String) -> Self {
        Self {
            installer_url,
            candidates: None,
        }
    }

    /// Replaces the platform's default candidate directories.
    #[must_use]
    pub fn with_candidates(mut self, candidates: Vec<Utf8PathBuf>) -> Self {
        self.candidates = Some(candidates);
        self
    }

    fn candidate_dirs(&self, ctx: &StepContext<'_>) -> Vec<Utf8PathBuf> {
        match &self.candidates {
            Some(candidates) => candidates.clone(),
            None => default_candidate_dirs(ctx.platform(), &ctx.settings.home),
        }
    }

    /// Makes `brew` locatable, adding the first candidate directory that
    /// holds it to the executor's search path. Returns false if none does.
    fn establish_path(&self, ctx: &StepContext<'_>) -> bool {
        if ctx.executor.locate(BREW).is_some() {
            return true;
        }
        for dir in self.candidate_dirs(ctx) {
            if dir.join(BREW).is_file() {
                ctx.executor.prepend_path(&dir);
                if ctx.executor.locate(BREW).is_some() {
                    info!("using {} from {}", BREW, dir);
                    return true;
                }
            }
        }
        false
    }
}

impl ProvisioningStep for PackageManagerStep {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("package-manager")
    }

    fn supports(&self, platform: Platform) -> bool {
        platform.is_known()
    }

    fn fatal_if_unsupported(&self) -> bool {
        true
    }

    fn is_satisfied(&self, ctx: &StepContext<'_>) -> Result<bool> {
        Ok(self.establish_path(ctx))
    }

    fn apply(&self, ctx: &StepContext<'_>) -> Result<()> {
        ctx.reporter.step("installing Homebrew");
        let installer = RemoteInstaller {
            label: "Homebrew",
            url: &self.installer_url,
            interpreter: "bash",
            args: &[],
            env: &[("NONINTERACTIVE", "1")],
        };
        let install_result = installer.run(ctx);

        if ctx.settings.dry_run {
            info!("dry run: skipping {} PATH verification", BREW);
            return install_result;
        }

        if self.establish_path(ctx) {
            if let Err(e) = install_result {
                warn!("Homebrew installer reported an error but {} is reachable: {:#}", BREW, e);
            }
            return Ok(());
        }

        let searched = self
            .candidate_dirs(ctx)
            .iter()
            .map(|dir| dir.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let reason = match install_result {
            Ok(()) => format!("`{}` not found in PATH or in [{}] after install", BREW, searched),
            Err(e) => format!("{:#}; `{}` not found in PATH or in [{}]", e, BREW, searched),
        };
        Err(ProvisionError::PackageManagerUnavailable(reason).into())
    }
}
