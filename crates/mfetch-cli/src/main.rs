use clap::Parser;
use mfetch_core::logging;

mod cli;

use crate::cli::{Cli, CliCommand};

fn main() {
    let cli = Cli::parse();
    match logging::init_logging(cli.verbose) {
        Ok(path) => tracing::debug!("logging to {}", path.display()),
        Err(err) => {
            logging::init_logging_stderr(cli.verbose);
            tracing::warn!("file logging unavailable, using stderr: {:#}", err);
        }
    }

    if let Err(err) = CliCommand::run(cli) {
        eprintln!("mfetch error: {:#}", err);
        std::process::exit(1);
    }
}
