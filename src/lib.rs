pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod platform;
pub mod privilege;
pub mod reporter;
pub mod runner;
pub mod step;

pub use error::ProvisionError;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{FmtSubscriber, filter::LevelFilter};

use crate::config::{Manifest, Settings};
use crate::executor::{CommandExecutor, RealCommandExecutor, Verbosity};
use crate::platform::Platform;
use crate::reporter::{ConsoleReporter, Reporter};
use crate::runner::{EXIT_SUCCESS, RunReport, Runner};
use crate::step::StepContext;

pub fn init_logging(log_level: cli::LogLevel) -> Result<()> {
    let filter = match log_level {
        cli::LogLevel::Trace => LevelFilter::TRACE,
        cli::LogLevel::Debug => LevelFilter::DEBUG,
        cli::LogLevel::Info => LevelFilter::INFO,
        cli::LogLevel::Warn => LevelFilter::WARN,
        cli::LogLevel::Error => LevelFilter::ERROR,
    };

    tracing::subscriber::set_global_default(
        FmtSubscriber::builder()
            .with_max_level(filter)
            .with_writer(std::io::stderr)
            .finish(),
    )
    .context("failed to set global default tracing subscriber")
}

/// Loads the manifest named on the command line, or the built-in one, and
/// validates it.
pub fn load_manifest(opts: &cli::Cli) -> Result<Manifest> {
    let manifest = match &opts.manifest {
        Some(path) => config::load_manifest(path)
            .with_context(|| format!("failed to load manifest from {}", path))?,
        None => Manifest::builtin()?,
    };
    manifest.validate().context("manifest validation failed")?;
    Ok(manifest)
}

/// Builds the immutable run settings from options, manifest and host facts.
pub fn build_settings(opts: &cli::Cli, manifest: &Manifest, platform: Platform) -> Result<Settings> {
    let home = dirs::home_dir().context("could not determine the home directory")?;
    let home = Utf8PathBuf::from_path_buf(home)
        .map_err(|p| anyhow::anyhow!("home directory is not valid UTF-8: {}", p.display()))?;

    let source_dir = match &opts.source_dir {
        Some(dir) => dir.clone(),
        None => {
            let cwd = std::env::current_dir().context("failed to read current directory")?;
            Utf8PathBuf::from_path_buf(cwd).map_err(|p| {
                anyhow::anyhow!("current directory is not valid UTF-8: {}", p.display())
            })?
        }
    };

    let zsh_custom = match &opts.zsh_custom {
        Some(dir) => dir.clone(),
        None => manifest.default_zsh_custom(&home),
    };

    Ok(Settings::new(platform, home, source_dir)
        .with_zsh_custom(zsh_custom)
        .with_verbosity(Verbosity::from_flag(opts.verbose))
        .with_dry_run(opts.dry_run)
        .with_privilege(manifest.privilege.resolve(privilege::running_as_root())))
}

/// Runs every manifest step and renders the summary.
pub fn run_provision(
    settings: &Settings,
    manifest: &Manifest,
    executor: &dyn CommandExecutor,
    reporter: &dyn Reporter,
) -> RunReport {
    reporter.announce_start(&format!(
        "{} {}: provisioning on {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        settings.platform
    ));
    if !settings.platform.is_known() {
        warn!("unsupported operating system detected");
    }

    let runner = Runner::new(manifest.steps());
    let ctx = StepContext::new(settings, executor, reporter);
    let report = runner.run(&ctx);
    reporter.summary(&report);
    report
}

/// Validates the manifest and logs the step plan without touching the host.
pub fn run_check(opts: &cli::Cli) -> Result<()> {
    let manifest = load_manifest(opts)?;
    let steps = manifest.steps();
    info!("manifest is valid, {} step(s) planned:", steps.len());
    for (index, step) in steps.iter().enumerate() {
        info!("  {}. {}", index + 1, step.name());
    }
    Ok(())
}

/// Entry point shared by the binary: returns the process exit status.
pub fn run(opts: &cli::Cli) -> Result<i32> {
    if opts.check {
        run_check(opts)?;
        return Ok(EXIT_SUCCESS);
    }

    let manifest = load_manifest(opts)?;
    let platform = platform::detect();
    let settings = build_settings(opts, &manifest, platform)?;
    info!(
        platform = %settings.platform,
        home = %settings.home,
        source_dir = %settings.source_dir,
        dry_run = settings.dry_run,
        "settings resolved"
    );

    let executor = RealCommandExecutor::new(settings.dry_run, settings.verbosity);
    let reporter = ConsoleReporter::stdout();
    let report = run_provision(&settings, &manifest, &executor, &reporter);
    Ok(report.exit_code())
}
