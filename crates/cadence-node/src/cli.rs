//! Command-line surface of the node binary.

use std::path::PathBuf;

use clap::Parser;

const CONFIG_HELP: &str = "\
Configuration flags must precede SCHEDULE_FILE:
  --config-path <PATH>          Read settings from a TOML file
  --daemon-host <HOST>          Host serving the daemon control API
  --daemon-port <PORT>          Port serving the daemon control API
  --daemon-binary <PATH>        Daemon executable launched on CONNECT
  --node-id <ID>                Node identity (defaults to the host name)
  --endpoint <NAME>             Endpoint registered with the daemon
  --results-dir <DIR>           Directory receiving the per-host log file
  --log-filter <FILTER>         Console log filter
  --log-format <compact|json>   Console log format
Every setting may also be supplied as a CADENCE_* environment variable.";

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(
    name = "cadence-node",
    version,
    about = "Replays a timed connectivity schedule against a local DTN daemon.",
    after_help = CONFIG_HELP
)]
pub(crate) struct Cli {
    /// Schedule script listing `<offset> <CONNECT|DISCONNECT|MESSAGE|LIFETIME>` lines.
    #[arg(value_name = "SCHEDULE_FILE")]
    pub(crate) schedule_file: PathBuf,
}
