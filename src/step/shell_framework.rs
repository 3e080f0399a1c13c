//! Oh My Zsh install.

use std::borrow::Cow;

use anyhow::{Result, bail};
use camino::Utf8PathBuf;

use super::{ProvisioningStep, RemoteInstaller, StepContext};

/// Ensures the shell framework directory exists under home.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellFrameworkStep {
    /// Relative to home
    directory: Utf8PathBuf,
    installer_url: String,
}

impl ShellFrameworkStep {
    pub fn new(directory: Utf8PathBuf, installer_url: String) -> Self {
        Self {
            directory,
            installer_url,
        }
    }

    pub fn install_dir(&self, ctx: &StepContext<'_>) -> Utf8PathBuf {
        ctx.settings.home.join(&self.directory)
    }
}

impl ProvisioningStep for ShellFrameworkStep {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("shell-framework")
    }

    fn is_satisfied(&self, ctx: &StepContext<'_>) -> Result<bool> {
        Ok(self.install_dir(ctx).is_dir())
    }

    fn apply(&self, ctx: &StepContext<'_>) -> Result<()> {
        let install_dir = self.install_dir(ctx);
        ctx.reporter
            .step(&format!("installing Oh My Zsh into {}", install_dir));

        let installer = RemoteInstaller {
            label: "Oh My Zsh",
            url: &self.installer_url,
            interpreter: "sh",
            args: &["--unattended"],
            env: &[
                ("ZSH", install_dir.as_str()),
                ("RUNZSH", "no"),
                ("CHSH", "no"),
                ("KEEP_ZSHRC", "yes"),
            ],
        };
        installer.run(ctx)?;

        if !ctx.settings.dry_run && !install_dir.is_dir() {
            bail!("installer finished but {} does not exist", install_dir);
        }
        Ok(())
    }
}
