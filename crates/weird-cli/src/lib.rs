//! weird CLI library
//!
//! Argument parsing, logging setup, backend dispatch and result rendering
//! for the `weird` binary, exposed so they can be tested without spawning
//! a process.

use std::ffi::{OsStr, OsString};
use std::io::Write;

use anyhow::{anyhow, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;
use weird_opencl::{
    HarnessConfig, HarnessError, LaunchReport, LaunchRequest, LogFormat, EXIT_FAILURE,
    EXIT_SUCCESS,
};

/// Name used in usage and diagnostic lines.
pub const BIN_NAME: &str = "weird";

/// Compile and launch the `weird` kernel on one OpenCL device, then print
/// its 32-byte output buffer as hex.
#[derive(Debug, Parser)]
#[command(name = "weird")]
#[command(version)]
#[command(about = "Launch one OpenCL kernel and print its output buffer as hex")]
#[cfg_attr(
    not(feature = "opencl"),
    command(after_help = "This build has no OpenCL runtime support; rebuild with `--features opencl` to launch kernels.")
)]
pub struct Cli {
    /// 1-based platform index
    #[arg(allow_negative_numbers = true)]
    pub platform: String,

    /// 1-based device index within the platform
    #[arg(allow_negative_numbers = true)]
    pub device: String,

    /// Options passed verbatim to the OpenCL compiler
    #[arg(allow_hyphen_values = true)]
    pub compiler_flags: Option<String>,
}

impl Cli {
    /// Indices are parsed loosely; out-of-range values are rejected later,
    /// against the enumerated platforms and devices.
    pub fn request(&self) -> LaunchRequest {
        LaunchRequest {
            platform_index: weird_opencl::parse_index(&self.platform),
            device_index: weird_opencl::parse_index(&self.device),
            compiler_flags: self.compiler_flags.clone(),
        }
    }
}

pub fn build_cli() -> clap::Command {
    Cli::command()
}

/// Parse a full argv, program name first.
///
/// Only 3 or 4 entries are a run, and every entry after the program name is
/// taken as a plain value, `--` and leading dashes included. A lone
/// `--help`/`-h`/`--version`/`-V` goes to clap as usual.
pub fn parse_args<I, T>(args: I) -> std::result::Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    match args.len() {
        2 if is_info_flag(&args[1]) => Cli::try_parse_from(args),
        3 | 4 => {
            args.insert(1, OsString::from("--"));
            Cli::try_parse_from(args)
        }
        n => Err(build_cli().error(
            ErrorKind::WrongNumberOfValues,
            format!("expected 2 or 3 arguments, got {}", n.saturating_sub(1)),
        )),
    }
}

fn is_info_flag(arg: &OsStr) -> bool {
    matches!(arg.to_str(), Some("-h" | "--help" | "-V" | "--version"))
}

/// Usage line printed for any malformed invocation.
pub fn usage() -> String {
    weird_opencl::HarnessError::Usage {
        program: BIN_NAME.to_string(),
    }
    .to_string()
}

/// Install the stderr log subscriber. `RUST_LOG` wins over the configured
/// level.
pub fn setup_logging(config: &HarnessConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = match config.log_format {
        LogFormat::Json => subscriber
            .json()
            .with_timer(tracing_subscriber::fmt::time::uptime())
            .try_init(),
        LogFormat::Compact => subscriber.compact().try_init(),
        LogFormat::Pretty => subscriber.pretty().try_init(),
    };
    installed.map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}

/// Run the launch against the OpenCL runtime.
#[cfg(feature = "opencl")]
pub fn execute(
    config: &HarnessConfig,
    request: &LaunchRequest,
) -> weird_opencl::Result<LaunchReport> {
    weird_opencl::launch(&weird_opencl::OpenClBackend::new(), config, request)
}

/// Without the `opencl` feature there is no runtime to launch on.
#[cfg(not(feature = "opencl"))]
pub fn execute(
    _config: &HarnessConfig,
    _request: &LaunchRequest,
) -> weird_opencl::Result<LaunchReport> {
    Err(weird_opencl::HarnessError::BackendUnavailable { backend: "OpenCL" })
}

/// Write the outcome of a run and return the process exit status.
///
/// Success prints the hex line on `out`. A build failure prints the build
/// log on `out`; every failure prints one `weird: ...` line on `err`.
pub fn render<E>(
    result: std::result::Result<LaunchReport, E>,
    out: &mut impl Write,
    err: &mut impl Write,
) -> i32
where
    E: Into<anyhow::Error>,
{
    match result.map_err(Into::into) {
        Ok(report) => match writeln!(out, "{}", report.hex()).and_then(|()| out.flush()) {
            Ok(()) => EXIT_SUCCESS,
            Err(e) => {
                let _ = writeln!(err, "{BIN_NAME}: cannot write result: {e}");
                EXIT_FAILURE
            }
        },
        Err(error) => {
            let harness_err = error.downcast_ref::<HarnessError>();
            if let Some(log) = harness_err.and_then(HarnessError::build_log) {
                let _ = writeln!(out, "{log}");
                let _ = out.flush();
            }
            let _ = writeln!(err, "{BIN_NAME}: {error}");
            harness_err.map_or(EXIT_FAILURE, HarnessError::exit_code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_line_names_the_binary() {
        assert_eq!(usage(), "USAGE: weird platform device [ compiler_flags ]");
    }

    #[test]
    fn request_uses_loose_index_parsing() {
        let cli = Cli::try_parse_from(["weird", "2abc", " 3", "-DFOO"]).unwrap();
        let req = cli.request();
        assert_eq!(req.platform_index, 2);
        assert_eq!(req.device_index, 3);
        assert_eq!(req.compiler_flags.as_deref(), Some("-DFOO"));
    }

    #[test]
    fn double_dash_is_a_plain_value() {
        let cli = parse_args(["weird", "--", "1", "1"]).unwrap();
        assert_eq!(cli.platform, "--");
        assert_eq!(cli.request().platform_index, 0);
    }

    #[test]
    fn five_entries_are_rejected_even_with_double_dash() {
        let err = parse_args(["weird", "1", "1", "--", "-O2"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WrongNumberOfValues);
    }

    #[test]
    fn verify_cli() {
        build_cli().debug_assert();
    }
}
