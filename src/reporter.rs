//! Human-facing progress output.
//!
//! The reporter is purely presentational: the runner decides outcomes and
//! records them in a [`RunReport`], then tells the reporter what happened.
//! Diagnostics go through `tracing`; the reporter is what a person watching
//! the run reads.

use std::cell::RefCell;
use std::io::{self, Write};

use crate::runner::RunReport;
use crate::step::StepResult;

const SEPARATOR_WIDTH: usize = 60;

/// Presentation primitives used by the runner and by steps.
pub trait Reporter {
    /// Announces the start of a run or a major section.
    fn announce_start(&self, title: &str);
    /// Announces an action about to happen.
    fn step(&self, message: &str);
    fn success(&self, message: &str);
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
    fn separator(&self);

    /// Renders the end-of-run summary.
    fn summary(&self, report: &RunReport) {
        self.separator();
        for record in report.records() {
            let line = format!("{}: {}", record.name, record.result);
            match &record.result {
                StepResult::Failed(_) => self.error(&line),
                StepResult::SkippedUnsupported => self.warn(&line),
                StepResult::Applied | StepResult::AlreadySatisfied => self.success(&line),
            }
        }
        if let Some(abort) = report.abort() {
            self.error(&format!("aborted: {}", abort));
        } else if report.has_failures() {
            self.warn(&format!(
                "completed with {} failed step(s)",
                report.failed().count()
            ));
        } else {
            self.success("environment is up to date");
        }
        self.separator();
    }
}

/// Writes plain, prefixed status lines to a writer.
pub struct ConsoleReporter<W: Write> {
    out: RefCell<W>,
}

impl ConsoleReporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: RefCell::new(out),
        }
    }

    /// Consumes the reporter and returns the writer.
    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn line(&self, prefix: &str, message: &str) {
        // A closed stdout never fails the run.
        if let Err(e) = writeln!(self.out.borrow_mut(), "{} {}", prefix, message) {
            tracing::debug!("failed to write progress line: {}", e);
        }
    }
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn announce_start(&self, title: &str) {
        self.separator();
        self.line("==>", title);
        self.separator();
    }

    fn step(&self, message: &str) {
        self.line("-->", message);
    }

    fn success(&self, message: &str) {
        self.line("[ok]", message);
    }

    fn info(&self, message: &str) {
        self.line("[info]", message);
    }

    fn warn(&self, message: &str) {
        self.line("[warn]", message);
    }

    fn error(&self, message: &str) {
        self.line("[error]", message);
    }

    fn separator(&self) {
        if let Err(e) = writeln!(self.out.borrow_mut(), "{}", "-".repeat(SEPARATOR_WIDTH)) {
            tracing::debug!("failed to write separator: {}", e);
        }
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn announce_start(&self, _title: &str) {}
    fn step(&self, _message: &str) {}
    fn success(&self, _message: &str) {}
    fn info(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
    fn separator(&self) {}
}
