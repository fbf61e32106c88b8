//! weird: launch one OpenCL kernel and print its output buffer.
//!
//! Prints the 32-byte result as 64 hex digits on stdout. Any failure exits
//! with status 1; a rejected program also prints its build log to stdout.

use std::io;

use anyhow::Result;
use clap::error::ErrorKind;
use tracing::debug;
use weird_cli::{execute, parse_args, render, setup_logging, usage, Cli, BIN_NAME};
use weird_opencl::{HarnessConfig, HarnessError, LaunchReport, EXIT_FAILURE};

fn main() {
    let cli = match parse_args(std::env::args_os()) {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(_) => {
            eprintln!("{BIN_NAME}: {}", usage());
            std::process::exit(EXIT_FAILURE);
        }
    };

    let code = render(run(&cli), &mut io::stdout().lock(), &mut io::stderr().lock());
    std::process::exit(code);
}

fn run(cli: &Cli) -> Result<LaunchReport> {
    let config = HarnessConfig::discover().map_err(HarnessError::from)?;
    setup_logging(&config)?;
    debug!(?config, "configuration loaded");

    Ok(execute(&config, &cli.request())?)
}
