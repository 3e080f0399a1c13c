//! Bulk package install through Homebrew.

use std::borrow::Cow;

use anyhow::{Result, bail};
use tracing::{debug, error, info, warn};

use super::{BREW, ProvisioningStep, StepContext};
use crate::executor::{CommandSpec, query, run_checked};
use crate::platform::Platform;

/// Installs a fixed, ordered set of packages.
///
/// A single batched `brew install` is tried first. If it fails, each package
/// is retried on its own, skipping the ones already present, so one bad
/// package does not block the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagesStep {
    packages: Vec<String>,
}

impl PackagesStep {
    pub fn new(packages: Vec<String>) -> Self {
        Self { packages }
    }

    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    fn is_installed(ctx: &StepContext<'_>, package: &str) -> bool {
        query(ctx.executor, &CommandSpec::new(BREW, ["list", "--versions", package]))
    }

    fn install_spec<'a>(packages: impl IntoIterator<Item = &'a str>) -> CommandSpec {
        let mut args = vec!["install"];
        args.extend(packages);
        CommandSpec::new(BREW, args)
    }
}

impl ProvisioningStep for PackagesStep {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("packages")
    }

    fn supports(&self, platform: Platform) -> bool {
        platform.is_known()
    }

    fn is_satisfied(&self, ctx: &StepContext<'_>) -> Result<bool> {
        Ok(self
            .packages
            .iter()
            .all(|package| Self::is_installed(ctx, package)))
    }

    fn apply(&self, ctx: &StepContext<'_>) -> Result<()> {
        ctx.reporter
            .step(&format!("installing {} package(s) with Homebrew", self.packages.len()));

        let batch = Self::install_spec(self.packages.iter().map(String::as_str));
        match run_checked(ctx.executor, &batch) {
            Ok(()) => return Ok(()),
            Err(e) => warn!("batched install failed, installing one by one: {:#}", e),
        }
        ctx.reporter
            .info("batched install failed, retrying packages individually");

        let mut failed = Vec::new();
        for package in &self.packages {
            if Self::is_installed(ctx, package) {
                debug!("{} already installed", package);
                continue;
            }
            info!("installing {}", package);
            match run_checked(ctx.executor, &Self::install_spec([package.as_str()])) {
                Ok(()) => ctx.reporter.success(&format!("installed {}", package)),
                Err(e) => {
                    error!("failed to install {}: {:#}", package, e);
                    ctx.reporter.error(&format!("failed to install {}", package));
                    failed.push(package.as_str());
                }
            }
        }

        if !failed.is_empty() {
            bail!("failed to install {} package(s): {}", failed.len(), failed.join(", "));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_spec_batches_in_order() {
        let spec = PackagesStep::install_spec(["zsh", "tmux", "jq"]);
        assert_eq!(spec.command, BREW);
        assert_eq!(spec.args, vec!["install", "zsh", "tmux", "jq"]);
    }

    #[test]
    fn non_fatal_on_unknown_platform() {
        let step = PackagesStep::new(vec!["zsh".into()]);
        assert!(!step.supports(Platform::Unknown));
        assert!(!step.fatal_if_unsupported());
    }
}
