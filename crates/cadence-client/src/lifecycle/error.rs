//! Error types for daemon lifecycle operations.

use std::ffi::OsString;
use std::io;

use nix::errno::Errno;
use thiserror::Error;

/// Errors raised while starting or stopping the daemon.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A daemon is already tracked by this manager.
    #[error("daemon for node '{node_id}' is already running (pid {pid})")]
    AlreadyRunning {
        /// Node the running daemon serves.
        node_id: String,
        /// Process identifier of the running daemon.
        pid: u32,
    },
    /// No daemon is tracked by this manager.
    #[error("no daemon is running")]
    NotRunning,
    /// The daemon binary could not be executed.
    #[error("failed to spawn daemon binary '{binary:?}': {source}")]
    LaunchDaemon {
        /// Binary that was executed.
        binary: OsString,
        /// Underlying spawn error.
        #[source]
        source: io::Error,
    },
    /// The daemon exited during its settle period.
    #[error("daemon exited during start-up (status: {exit_status:?}): {stderr}")]
    StartupFailed {
        /// Exit code, when the process exited normally.
        exit_status: Option<i32>,
        /// Most recent lines the daemon wrote to stderr.
        stderr: String,
    },
    /// Waiting on the daemon process failed.
    #[error("failed to monitor daemon process: {source}")]
    MonitorChild {
        /// Underlying wait error.
        #[source]
        source: io::Error,
    },
    /// The pid cannot address a single process.
    #[error("invalid daemon pid {pid}: {message}")]
    InvalidPid {
        /// Offending pid.
        pid: u32,
        /// Why the pid was refused.
        message: String,
    },
    /// Delivering a signal failed.
    #[error("failed to signal daemon pid {pid}: {source}")]
    SignalFailed {
        /// Signalled pid.
        pid: u32,
        /// Errno reported by `kill(2)`.
        #[source]
        source: Errno,
    },
    /// Forcibly killing the daemon failed.
    #[error("failed to kill daemon pid {pid}: {source}")]
    KillFailed {
        /// Killed pid.
        pid: u32,
        /// Underlying kill or wait error.
        #[source]
        source: io::Error,
    },
}
