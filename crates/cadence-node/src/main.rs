//! Entry point for a scheduled DTN experiment node.
//!
//! The binary delegates to [`cadence_node::run`], which loads configuration,
//! reads the schedule script named on the command line, and drives the local
//! daemon through it.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    cadence_node::run(std::env::args_os(), &mut stdout, &mut stderr)
}
