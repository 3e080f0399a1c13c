//! Essential toolchain: compiler, version control client and HTTP fetch tool.

use std::borrow::Cow;

use anyhow::{Result, bail};
use tracing::info;

use super::{ProvisioningStep, StepContext};
use crate::executor::{CommandSpec, query, run_checked};
use crate::platform::Platform;

/// Installs the system toolchain with the host package manager.
///
/// - Debian: `dpkg -s` / `apt-get install`
/// - RedHat: `rpm -q` / `dnf install`
/// - macOS: `xcode-select -p` / `xcode-select --install`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainStep {
    debian: Vec<String>,
    redhat: Vec<String>,
}

impl ToolchainStep {
    pub fn new(debian: Vec<String>, redhat: Vec<String>) -> Self {
        Self { debian, redhat }
    }

    /// Packages required on `platform`. Empty on macOS and unknown hosts.
    pub fn packages(&self, platform: Platform) -> &[String] {
        match platform {
            Platform::Debian => &self.debian,
            Platform::RedHat => &self.redhat,
            Platform::MacOs | Platform::Unknown => &[],
        }
    }

    fn query_spec(platform: Platform, package: &str) -> Option<CommandSpec> {
        match platform {
            Platform::Debian => Some(CommandSpec::new("dpkg", ["-s", package])),
            Platform::RedHat => Some(CommandSpec::new("rpm", ["-q", package])),
            Platform::MacOs | Platform::Unknown => None,
        }
    }

    fn missing_packages(&self, ctx: &StepContext<'_>) -> Vec<&str> {
        let platform = ctx.platform();
        self.packages(platform)
            .iter()
            .map(String::as_str)
            .filter(|package| match Self::query_spec(platform, package) {
                Some(spec) => !query(ctx.executor, &spec),
                None => true,
            })
            .collect()
    }
}

impl ProvisioningStep for ToolchainStep {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("toolchain")
    }

    fn supports(&self, platform: Platform) -> bool {
        platform.is_known()
    }

    fn fatal_if_unsupported(&self) -> bool {
        true
    }

    fn is_satisfied(&self, ctx: &StepContext<'_>) -> Result<bool> {
        match ctx.platform() {
            Platform::MacOs => Ok(query(
                ctx.executor,
                &CommandSpec::new("xcode-select", ["-p"]),
            )),
            Platform::Debian | Platform::RedHat => Ok(self.missing_packages(ctx).is_empty()),
            Platform::Unknown => Ok(false),
        }
    }

    fn apply(&self, ctx: &StepContext<'_>) -> Result<()> {
        let privilege = ctx.settings.privilege;
        match ctx.platform() {
            Platform::MacOs => {
                ctx.reporter.step("installing Xcode command line tools");
                run_checked(ctx.executor, &CommandSpec::new("xcode-select", ["--install"]))?;
                ctx.reporter
                    .info("finish the Xcode command line tools dialog if one opened");
            }
            Platform::Debian => {
                let missing = self.missing_packages(ctx);
                info!("installing toolchain packages: {}", missing.join(" "));
                ctx.reporter
                    .step(&format!("installing {} with apt-get", missing.join(" ")));
                run_checked(
                    ctx.executor,
                    &CommandSpec::new("apt-get", ["update"]).with_privilege(privilege),
                )?;
                let mut args = vec!["install", "-y"];
                args.extend(missing);
                run_checked(
                    ctx.executor,
                    &CommandSpec::new("apt-get", args)
                        .with_env("DEBIAN_FRONTEND", "noninteractive")
                        .with_privilege(privilege),
                )?;
            }
            Platform::RedHat => {
                let missing = self.missing_packages(ctx);
                info!("installing toolchain packages: {}", missing.join(" "));
                ctx.reporter
                    .step(&format!("installing {} with dnf", missing.join(" ")));
                let mut args = vec!["install", "-y"];
                args.extend(missing);
                run_checked(
                    ctx.executor,
                    &CommandSpec::new("dnf", args).with_privilege(privilege),
                )?;
            }
            Platform::Unknown => bail!("no toolchain installer for {}", Platform::Unknown),
        }
        Ok(())
    }
}
