use clap::Parser;
use sortdir::cli::{Args, FATAL_EXIT_CODE, run};
use sortdir::output::Logger;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = Args::parse();
    let logger = Logger::from_flags(args.verbose, args.quiet);

    match run(&args, &logger) {
        Ok(status) => ExitCode::from(status.exit_code()),
        Err(e) => {
            logger.error(format_args!("Error: {}", e));
            ExitCode::from(FATAL_EXIT_CODE)
        }
    }
}
