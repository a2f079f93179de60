//! Scheduled experiment node for DTN testbeds.
//!
//! Each testbed host runs one `cadence-node` with its own schedule script.
//! The node starts and stops the local DTN daemon at scripted offsets to
//! emulate link availability, keeps an application endpoint registered
//! while the daemon runs, and greets every known peer when told to. All
//! activity is logged to the console and to a per-host file under the
//! results directory.

mod cli;
mod config;
mod errors;
mod node;
pub mod schedule;
pub mod telemetry;

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use cadence_config::Config;
use clap::Parser;
use clap::error::ErrorKind;
use tracing::{error, info};

use crate::cli::Cli;
use crate::config::{ConfigLoader, OrthoConfigLoader, cli_arguments, split_config_arguments};
pub(crate) use crate::errors::AppError;
pub use crate::node::DtnNode;
use crate::schedule::{MonotonicClock, Scheduler, load_schedule};

const NODE_TARGET: &str = "cadence::node";

/// Runs the node using the provided arguments and output handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with_loader(args, stdout, stderr, &OrthoConfigLoader)
}

fn run_with_loader<I, W, E, L>(args: I, stdout: &mut W, stderr: &mut E, loader: &L) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let args: Vec<OsString> = args.into_iter().collect();
    let split = split_config_arguments(&args);

    let cli = match Cli::try_parse_from(cli_arguments(&args, &split)) {
        Ok(cli) => cli,
        Err(error) if matches!(error.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            return report(stdout, &error, ExitCode::SUCCESS);
        }
        Err(error) => return report(stderr, &AppError::CliUsage(error), ExitCode::FAILURE),
    };

    match loader
        .load(&split.config_arguments)
        .and_then(|config| execute(&cli, &config))
    {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => report(stderr, &error, ExitCode::FAILURE),
    }
}

fn report<W: Write>(stream: &mut W, message: &dyn std::fmt::Display, code: ExitCode) -> ExitCode {
    if writeln!(stream, "{message}").is_err() {
        return ExitCode::FAILURE;
    }
    code
}

fn execute(cli: &Cli, config: &Config) -> Result<(), AppError> {
    let telemetry = telemetry::initialise(config)?;
    let node_id = config.node_id();
    info!(
        target: NODE_TARGET,
        node_id = %node_id,
        schedule = %cli.schedule_file.display(),
        log_file = ?telemetry.log_file(),
        "node starting"
    );

    let schedule = load_schedule(&cli.schedule_file).inspect_err(|error| {
        error!(target: NODE_TARGET, %error, "schedule unavailable");
    })?;
    let node = DtnNode::from_config(config)?;
    let mut scheduler = Scheduler::new(node, MonotonicClock::new(), node_id);
    scheduler.run(&schedule);
    Ok(())
}
