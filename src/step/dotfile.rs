//! Dotfile deployment: copy a file or directory from the source directory
//! into home.

use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use camino::Utf8PathBuf;
use tracing::debug;
use walkdir::WalkDir;

use super::{ProvisioningStep, StepContext};

/// Copies `source` (under the source directory) to `destination` (under home).
///
/// A missing source is not an error: the step reports it and counts as
/// satisfied. Directories are copied recursively, overwriting files in
/// place; entries only present in the destination are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotfileStep {
    source: Utf8PathBuf,
    destination: Utf8PathBuf,
}

impl DotfileStep {
    pub fn new(source: Utf8PathBuf, destination: Utf8PathBuf) -> Self {
        Self {
            source,
            destination,
        }
    }

    pub fn source_path(&self, ctx: &StepContext<'_>) -> Utf8PathBuf {
        ctx.settings.source_dir.join(&self.source)
    }

    pub fn destination_path(&self, ctx: &StepContext<'_>) -> Utf8PathBuf {
        ctx.settings.home.join(&self.destination)
    }
}

impl ProvisioningStep for DotfileStep {
    fn name(&self) -> Cow<'_, str> {
        Cow::Owned(format!("dotfile:{}", self.destination))
    }

    fn is_satisfied(&self, ctx: &StepContext<'_>) -> Result<bool> {
        let source = self.source_path(ctx);
        if fs::symlink_metadata(&source).is_err() {
            ctx.reporter
                .info(&format!("{} not found, skipping", source));
            return Ok(true);
        }
        let destination = self.destination_path(ctx);
        tree_matches(source.as_std_path(), destination.as_std_path())
            .with_context(|| format!("failed to compare {} with {}", source, destination))
    }

    fn apply(&self, ctx: &StepContext<'_>) -> Result<()> {
        let source = self.source_path(ctx);
        let destination = self.destination_path(ctx);
        ctx.reporter
            .step(&format!("copying {} to {}", source, destination));

        if ctx.settings.dry_run {
            tracing::info!("dry run: would copy {} to {}", source, destination);
            return Ok(());
        }

        copy_tree(source.as_std_path(), destination.as_std_path())
            .with_context(|| format!("failed to copy {} to {}", source, destination))
    }
}

/// Maps a path under `source` to the matching path under `destination`.
fn target_path(source: &Path, destination: &Path, entry: &Path) -> Result<PathBuf> {
    let relative = entry.strip_prefix(source)?;
    if relative.as_os_str().is_empty() {
        Ok(destination.to_path_buf())
    } else {
        Ok(destination.join(relative))
    }
}

/// Returns true if every entry under `source` exists at the matching place
/// under `destination` with identical content.
fn tree_matches(source: &Path, destination: &Path) -> Result<bool> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry?;
        let target = target_path(source, destination, entry.path())?;
        let file_type = entry.file_type();

        let matches = if file_type.is_dir() {
            target.is_dir()
        } else if file_type.is_symlink() {
            match fs::read_link(&target) {
                Ok(link) => link == fs::read_link(entry.path())?,
                Err(_) => false,
            }
        } else {
            files_equal(entry.path(), &target)?
        };

        if !matches {
            debug!("{} differs from {}", target.display(), entry.path().display());
            return Ok(false);
        }
    }
    Ok(true)
}

fn files_equal(a: &Path, b: &Path) -> io::Result<bool> {
    let b_meta = match fs::metadata(b) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if !b_meta.is_file() || fs::metadata(a)?.len() != b_meta.len() {
        return Ok(false);
    }
    Ok(fs::read(a)? == fs::read(b)?)
}

/// Copies a file or a directory tree, overwriting existing files.
fn copy_tree(source: &Path, destination: &Path) -> Result<()> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry?;
        let target = target_path(source, destination, entry.path())?;
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("failed to create directory: {}", target.display()))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }

        if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            if target.is_dir() {
                bail!("destination {} is a directory, not replacing it", target.display());
            }
            fs::copy(entry.path(), &target).with_context(|| {
                format!("failed to copy {} to {}", entry.path().display(), target.display())
            })?;
        }
        debug!("copied {}", target.display());
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(source: &Path, target: &Path) -> Result<()> {
    let link = fs::read_link(source)
        .with_context(|| format!("failed to read symlink {}", source.display()))?;
    match fs::symlink_metadata(target) {
        Ok(meta) if meta.is_dir() => {
            bail!("destination {} is a directory, not replacing it", target.display())
        }
        Ok(_) => fs::remove_file(target)
            .with_context(|| format!("failed to replace {}", target.display()))?,
        Err(_) => {}
    }
    std::os::unix::fs::symlink(&link, target)
        .with_context(|| format!("failed to create symlink {}", target.display()))
}

#[cfg(not(unix))]
fn copy_symlink(source: &Path, target: &Path) -> Result<()> {
    fs::copy(source, target)
        .map(|_| ())
        .with_context(|| format!("failed to copy {} to {}", source.display(), target.display()))
}
