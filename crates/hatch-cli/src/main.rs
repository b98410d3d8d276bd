//! # hatch
//!
//! Pulls a container image into a local rootfs and runs one command
//! inside it, isolated by a root change and a PID namespace.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

mod commands;

use clap::Parser;
use hatch_common::constants::PIPELINE_FAILURE_EXIT_CODE;
use tracing_subscriber::EnvFilter;

use crate::commands::Cli;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match commands::execute(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "hatch failed");
            #[allow(clippy::print_stderr)]
            {
                eprintln!("hatch: {e:#}");
            }
            PIPELINE_FAILURE_EXIT_CODE
        }
    };
    std::process::exit(code);
}
