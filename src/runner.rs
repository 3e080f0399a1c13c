//! Provisioning runner.
//!
//! Runs steps strictly in order on the calling thread. A fatal error from a
//! step stops the sequence; every other failure is recorded and the run
//! moves on to the next step.

use tracing::{error, info, warn};

use crate::error::ProvisionError;
use crate::step::{ProvisioningStep, StepContext, StepResult};

/// Exit status when every step succeeded or had nothing to do.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit status when a fatal condition aborted the run.
pub const EXIT_FATAL: i32 = 1;
/// Exit status when the run completed but at least one step failed.
pub const EXIT_PARTIAL: i32 = 2;

/// Outcome of one executed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub name: String,
    pub result: StepResult,
}

/// Ordered outcomes of a run, plus the fatal error that stopped it, if any.
#[derive(Debug, Default)]
pub struct RunReport {
    records: Vec<StepRecord>,
    abort: Option<ProvisionError>,
}

impl RunReport {
    /// Results in execution order.
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    /// The fatal error that stopped the run.
    pub fn abort(&self) -> Option<&ProvisionError> {
        self.abort.as_ref()
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_some()
    }

    /// Records of steps that failed without aborting.
    pub fn failed(&self) -> impl Iterator<Item = &StepRecord> {
        self.records.iter().filter(|r| r.result.is_failure())
    }

    /// Records of steps that changed the system.
    pub fn applied(&self) -> impl Iterator<Item = &StepRecord> {
        self.records
            .iter()
            .filter(|r| r.result == StepResult::Applied)
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }

    /// Process exit status for this report.
    pub fn exit_code(&self) -> i32 {
        if self.is_aborted() {
            EXIT_FATAL
        } else if self.has_failures() {
            EXIT_PARTIAL
        } else {
            EXIT_SUCCESS
        }
    }
}

/// Sequences provisioning steps.
pub struct Runner {
    steps: Vec<Box<dyn ProvisioningStep>>,
}

impl Runner {
    pub fn new(steps: Vec<Box<dyn ProvisioningStep>>) -> Self {
        Self { steps }
    }

    /// Runs every step in order until the end or the first fatal error.
    pub fn run(&self, ctx: &StepContext<'_>) -> RunReport {
        let mut report = RunReport::default();
        let total = self.steps.len();
        info!("starting run with {} step(s) on {}", total, ctx.platform());

        for (index, step) in self.steps.iter().enumerate() {
            let name = step.name().into_owned();
            info!("running step {}/{}: {}", index + 1, total, name);
            ctx.reporter.step(&format!("[{}/{}] {}", index + 1, total, name));

            match step.run(ctx) {
                Ok(result) => {
                    match &result {
                        StepResult::AlreadySatisfied => {
                            ctx.reporter.success(&format!("{}: already satisfied", name))
                        }
                        StepResult::Applied => ctx.reporter.success(&format!("{}: done", name)),
                        StepResult::SkippedUnsupported => ctx.reporter.warn(&format!(
                            "{}: not supported on {}, skipped",
                            name,
                            ctx.platform()
                        )),
                        StepResult::Failed(reason) => {
                            error!("step {} failed: {}", name, reason);
                            ctx.reporter.error(&format!("{}: {}", name, reason));
                        }
                    }
                    report.records.push(StepRecord { name, result });
                }
                Err(e) => {
                    error!("step {} aborted the run: {}", name, e);
                    ctx.reporter.error(&e.to_string());
                    report.abort = Some(e);
                    break;
                }
            }
        }

        if report.is_aborted() {
            warn!(
                "run aborted after {} of {} step(s)",
                report.records.len(),
                total
            );
        } else {
            info!(
                "run completed: {} applied, {} failed",
                report.applied().count(),
                report.failed().count()
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::executor::{RealCommandExecutor, Verbosity};
    use crate::platform::Platform;
    use crate::reporter::NullReporter;

    fn report(results: Vec<StepResult>, abort: Option<ProvisionError>) -> RunReport {
        RunReport {
            records: results
                .into_iter()
                .enumerate()
                .map(|(i, result)| StepRecord {
                    name: format!("step-{}", i),
                    result,
                })
                .collect(),
            abort,
        }
    }

    #[test]
    fn exit_code_success() {
        let r = report(
            vec![
                StepResult::Applied,
                StepResult::AlreadySatisfied,
                StepResult::SkippedUnsupported,
            ],
            None,
        );
        assert_eq!(r.exit_code(), EXIT_SUCCESS);
        assert_eq!(r.applied().count(), 1);
    }

    #[test]
    fn exit_code_partial_failure() {
        let r = report(
            vec![StepResult::Applied, StepResult::Failed("boom".into())],
            None,
        );
        assert!(r.has_failures());
        assert_eq!(r.exit_code(), EXIT_PARTIAL);
    }

    #[test]
    fn exit_code_fatal_wins() {
        let r = report(
            vec![StepResult::Failed("boom".into())],
            Some(ProvisionError::UnsupportedPlatform {
                step: "toolchain".into(),
                platform: Platform::Unknown,
            }),
        );
        assert!(r.is_aborted());
        assert_eq!(r.exit_code(), EXIT_FATAL);
    }

    #[test]
    fn empty_runner_reports_success() {
        let settings = Settings::new(Platform::Debian, "/home/me".into(), "/src".into());
        let executor = RealCommandExecutor::new(true, Verbosity::Quiet);
        let reporter = NullReporter;
        let ctx = StepContext::new(&settings, &executor, &reporter);
        let report = Runner::new(Vec::new()).run(&ctx);
        assert!(report.records().is_empty());
        assert_eq!(report.exit_code(), EXIT_SUCCESS);
    }
}
