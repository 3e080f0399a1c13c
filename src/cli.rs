use camino::Utf8PathBuf;
use clap::builder::FalseyValueParser;
use clap::{Parser, ValueEnum};

/// Every option has an environment variable; running with no arguments
/// is the normal way to use the tool.
#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_DESCRIPTION"),
)]
pub struct Cli {
    /// Stream output of package managers and installers
    #[arg(short, long, env = "VERBOSE", value_parser = FalseyValueParser::new())]
    pub verbose: bool,

    /// Shell framework customization directory [default: <framework dir>/custom]
    #[arg(long, env = "ZSH_CUSTOM")]
    pub zsh_custom: Option<Utf8PathBuf>,

    /// YAML manifest replacing the built-in one
    #[arg(short, long, env = "ENVSTRAP_MANIFEST")]
    pub manifest: Option<Utf8PathBuf>,

    /// Directory holding the dotfiles to deploy [default: current directory]
    #[arg(long, env = "ENVSTRAP_SOURCE_DIR")]
    pub source_dir: Option<Utf8PathBuf>,

    /// Set the log level
    #[arg(short, long, default_value = "info", env = "ENVSTRAP_LOG_LEVEL")]
    pub log_level: LogLevel,

    /// Do not run, just show what would be done
    #[arg(long, env = "ENVSTRAP_DRY_RUN", value_parser = FalseyValueParser::new())]
    pub dry_run: bool,

    /// Validate the manifest, list the planned steps and exit
    #[arg(long)]
    pub check: bool,
}

/// Represents log levels for controlling the verbosity of logging output.
///
/// Maps directly to the levels of the `tracing` crate. Child process output
/// is logged at DEBUG unless `--verbose` is set, so `--log-level debug` also
/// surfaces it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
