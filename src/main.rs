use std::process::ExitCode;

use envstrap::cli;
use envstrap::runner::EXIT_FATAL;
use tracing::error;

fn main() -> ExitCode {
    let args = cli::parse_args();

    if let Err(e) = envstrap::init_logging(args.log_level) {
        eprintln!("{:#}", e);
        return ExitCode::FAILURE;
    }

    let code = match envstrap::run(&args) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            EXIT_FATAL
        }
    };
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
