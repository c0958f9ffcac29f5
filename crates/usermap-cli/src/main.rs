//! # usermap
//!
//! Mounts one user's home directory tree as a FUSE filesystem served
//! from inside that tree, under that user's identity.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

mod cli;
mod logging;
mod run;

use std::process::ExitCode;

use clap::Parser;
use usermap_common::constants::BIN_NAME;

use crate::cli::Cli;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    let config = cli.into_config();

    if let Err(err) = logging::init(config.debug) {
        report(&err);
        return ExitCode::FAILURE;
    }

    match run::execute(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            if !config.debug {
                report(&err);
            }
            ExitCode::FAILURE
        }
    }
}

// stderr is /dev/null once detached, so this only reaches a terminal
// during startup
#[allow(clippy::print_stderr)]
fn report(err: &anyhow::Error) {
    eprintln!("{BIN_NAME}: {err:#}");
}
