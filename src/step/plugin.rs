//! Shell framework plugins cloned from git repositories.

use std::borrow::Cow;
use std::fs;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use tracing::warn;

use super::{ProvisioningStep, StepContext};
use crate::executor::{CommandSpec, query, run_checked};

/// Query that succeeds only for a checkout whose `HEAD` resolves. A clone
/// interrupted before checkout leaves a directory that fails it.
fn head_query(target: &Utf8Path) -> CommandSpec {
    CommandSpec::new(
        "git",
        ["-C", target.as_str(), "rev-parse", "--verify", "--quiet", "HEAD"],
    )
}

/// Clones one plugin into `<plugins dir>/<name>` unless a complete checkout
/// is already there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginStep {
    name: String,
    source: String,
}

impl PluginStep {
    pub fn new(name: String, source: String) -> Self {
        Self { name, source }
    }

    pub fn target_dir(&self, ctx: &StepContext<'_>) -> Utf8PathBuf {
        ctx.settings.plugins_dir().join(&self.name)
    }
}

impl ProvisioningStep for PluginStep {
    fn name(&self) -> Cow<'_, str> {
        Cow::Owned(format!("plugin:{}", self.name))
    }

    fn is_satisfied(&self, ctx: &StepContext<'_>) -> Result<bool> {
        let target = self.target_dir(ctx);
        Ok(target.is_dir() && query(ctx.executor, &head_query(&target)))
    }

    fn apply(&self, ctx: &StepContext<'_>) -> Result<()> {
        let target = self.target_dir(ctx);
        ctx.reporter
            .step(&format!("cloning {} from {}", self.name, self.source));

        if !ctx.settings.dry_run {
            if target.is_dir() {
                warn!("removing incomplete checkout at {}", target);
                fs::remove_dir_all(&target)
                    .with_context(|| format!("failed to remove incomplete checkout {}", target))?;
            }
            let plugins_dir = ctx.settings.plugins_dir();
            fs::create_dir_all(&plugins_dir)
                .with_context(|| format!("failed to create directory: {}", plugins_dir))?;
        }

        let clone = CommandSpec::new(
            "git",
            ["clone", "--depth", "1", self.source.as_str(), target.as_str()],
        );
        run_checked(ctx.executor, &clone)
            .with_context(|| format!("failed to clone plugin {}", self.name))
    }
}
