//! Error types for envstrap.
//!
//! Steps and executors return `anyhow::Result` and attach context freely.
//! Conditions the runner has to recognise travel inside that chain as a
//! [`ProvisionError`], which the runner downcasts to decide whether the
//! rest of the run is abandoned.

use std::io;

use crate::platform::Platform;

/// Short description of an I/O failure, e.g. `not found`, without the
/// platform's `(os error N)` suffix for the common kinds.
fn describe_io(err: &io::Error) -> String {
    let text = match err.kind() {
        io::ErrorKind::NotFound => "not found",
        io::ErrorKind::PermissionDenied => "permission denied",
        io::ErrorKind::IsADirectory => "is a directory",
        io::ErrorKind::NotADirectory => "not a directory",
        _ => return format!("I/O error: {}", err),
    };
    format!("I/O error: {}", text)
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProvisionError {
    /// The manifest parsed but describes something envstrap refuses to do.
    #[error("validation error: {0}")]
    Validation(String),

    /// The manifest could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// A command ran and failed, or could not be supervised.
    #[error("command execution failed: {command}: {status}")]
    Execution { command: String, status: String },

    #[error("command not found in PATH: {command}")]
    CommandNotFound { command: String },

    #[error("{context}: {message}")]
    Io {
        /// Path or action involved
        context: String,
        message: String,
        #[source]
        source: io::Error,
    },

    /// A step that needs a known platform ran on an unsupported host.
    #[error("unsupported operating system ({platform}): {step} cannot run")]
    UnsupportedPlatform { step: String, platform: Platform },

    /// `brew` is still unreachable after the bootstrap step ran.
    #[error("package manager unavailable: {0}")]
    PackageManagerUnavailable(String),
}

impl ProvisionError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            message: describe_io(&source),
            source,
        }
    }

    /// Whether the runner must stop after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedPlatform { .. } | Self::PackageManagerUnavailable(_)
        )
    }
}
