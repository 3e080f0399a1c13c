//! Forwarding of child process output into the log.

use std::io::{BufRead, BufReader, Read};

use strum::Display;

use super::Verbosity;

/// Which child stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub(super) enum Stream {
    Stdout,
    Stderr,
}

/// Best-effort text of a reader thread's panic payload.
pub(super) fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

/// Logs every line read from `pipe` until EOF.
///
/// Invalid UTF-8 is replaced lossily. A read error ends forwarding without
/// affecting the command's outcome, which depends on its exit status only.
pub(super) fn forward_to_log<R: Read>(pipe: Option<R>, stream: Stream, verbosity: Verbosity) {
    let Some(pipe) = pipe else {
        tracing::error!(%stream, "child stream was not captured");
        return;
    };

    for chunk in BufReader::new(pipe).split(b'\n') {
        match chunk {
            Ok(bytes) => emit(&bytes, stream, verbosity),
            Err(e) => {
                tracing::error!(%stream, error = %e, "stopped reading child output");
                return;
            }
        }
    }
}

fn emit(bytes: &[u8], stream: Stream, verbosity: Verbosity) {
    let text = String::from_utf8_lossy(bytes);
    let line = text.strip_suffix('\r').unwrap_or(&text);
    match (verbosity, stream) {
        (Verbosity::Quiet, _) => tracing::debug!(%stream, "{}", line),
        (Verbosity::Verbose, Stream::Stdout) => tracing::info!(%stream, "{}", line),
        (Verbosity::Verbose, Stream::Stderr) => tracing::warn!(%stream, "{}", line),
    }
}
