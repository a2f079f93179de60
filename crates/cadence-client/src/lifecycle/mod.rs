//! Supervision of the local DTN daemon process.
//!
//! [`DaemonManager`] owns at most one daemon child process. Starting spawns
//! the configured binary, drains its output into the log, and waits a short
//! settle period to catch immediate failures such as bad flags or a port
//! already in use. Stopping asks the daemon to exit with SIGTERM and kills it
//! if it has not exited within the timeout. Dropping the manager kills any
//! daemon it still tracks.
//!
//! - [`spawning`] builds the daemon command line.
//! - [`shutdown`] signals and reaps the process.
//! - [`output`] drains the daemon's standard streams.

mod error;
mod output;
mod shutdown;
mod spawning;

#[cfg(test)]
mod manager_tests;

use std::ffi::{OsStr, OsString};
use std::process::Child;
use std::thread;
use std::time::Duration;

use tracing::{error, info, warn};

pub use self::error::LifecycleError;
use self::output::DaemonOutput;
pub use self::shutdown::StopOutcome;
pub use self::spawning::DaemonLaunch;

pub(crate) const LIFECYCLE_TARGET: &str = "cadence::lifecycle";

/// Time a freshly spawned daemon must survive to count as started.
pub const DEFAULT_SETTLE_TIME: Duration = Duration::from_secs(1);
/// Time a daemon is given to exit after SIGTERM.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct RunningDaemon {
    node_id: String,
    child: Child,
    output: DaemonOutput,
}

/// Starts, tracks, and stops one daemon process.
#[derive(Debug)]
pub struct DaemonManager {
    binary: OsString,
    settle_time: Duration,
    poll_interval: Duration,
    daemon: Option<RunningDaemon>,
}

impl DaemonManager {
    /// Creates a manager that launches `binary`.
    #[must_use]
    pub fn new(binary: impl AsRef<OsStr>) -> Self {
        Self {
            binary: binary.as_ref().to_os_string(),
            settle_time: DEFAULT_SETTLE_TIME,
            poll_interval: DEFAULT_POLL_INTERVAL,
            daemon: None,
        }
    }

    /// Overrides the settle period observed after spawning.
    #[must_use]
    pub fn with_settle_time(mut self, settle_time: Duration) -> Self {
        self.settle_time = settle_time;
        self
    }

    /// Overrides how often a stopping daemon is checked for exit.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Reports whether a daemon is tracked.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.daemon.is_some()
    }

    /// Process id of the tracked daemon.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.daemon.as_ref().map(|daemon| daemon.child.id())
    }

    /// Spawns the daemon and waits for it to settle.
    ///
    /// # Errors
    ///
    /// Fails when a daemon is already tracked, when the binary cannot be
    /// executed, or when the daemon exits during the settle period. In the
    /// last case the error carries the daemon's recent stderr output.
    pub fn start(&mut self, launch: &DaemonLaunch) -> Result<(), LifecycleError> {
        if let Some(daemon) = &self.daemon {
            let pid = daemon.child.id();
            warn!(target: LIFECYCLE_TARGET, node_id = %daemon.node_id, pid, "daemon already running");
            return Err(LifecycleError::AlreadyRunning {
                node_id: daemon.node_id.clone(),
                pid,
            });
        }

        let mut child = spawning::spawn_daemon(&self.binary, launch).inspect_err(|error| {
            error!(target: LIFECYCLE_TARGET, %error, "failed to spawn daemon");
        })?;
        let output = DaemonOutput::capture(&mut child, &launch.node_id);
        thread::sleep(self.settle_time);

        match child.try_wait() {
            Ok(None) => {
                info!(
                    target: LIFECYCLE_TARGET,
                    node_id = %launch.node_id,
                    pid = child.id(),
                    "daemon started"
                );
                self.daemon = Some(RunningDaemon {
                    node_id: launch.node_id.clone(),
                    child,
                    output,
                });
                Ok(())
            }
            Ok(Some(status)) => {
                let stderr = output.finish();
                error!(
                    target: LIFECYCLE_TARGET,
                    node_id = %launch.node_id,
                    %status,
                    stderr = %stderr,
                    "daemon exited during start-up"
                );
                Err(LifecycleError::StartupFailed {
                    exit_status: status.code(),
                    stderr,
                })
            }
            Err(source) => {
                reap(&mut child);
                Err(LifecycleError::MonitorChild { source })
            }
        }
    }

    /// Stops the tracked daemon.
    ///
    /// The handle is released on success. When termination fails the daemon
    /// stays tracked so a later stop or drop can retry.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotRunning`] when no daemon is tracked, or
    /// the signalling or reaping error otherwise.
    pub fn stop(&mut self, timeout: Duration) -> Result<StopOutcome, LifecycleError> {
        let Some(mut daemon) = self.daemon.take() else {
            warn!(target: LIFECYCLE_TARGET, "stop requested with no daemon running");
            return Err(LifecycleError::NotRunning);
        };
        match shutdown::terminate(&mut daemon.child, timeout, self.poll_interval) {
            Ok(outcome) => {
                info!(target: LIFECYCLE_TARGET, node_id = %daemon.node_id, ?outcome, "daemon stopped");
                daemon.output.finish();
                Ok(outcome)
            }
            Err(error) => {
                error!(target: LIFECYCLE_TARGET, node_id = %daemon.node_id, %error, "failed to stop daemon");
                self.daemon = Some(daemon);
                Err(error)
            }
        }
    }
}

impl Drop for DaemonManager {
    fn drop(&mut self) {
        if let Some(mut daemon) = self.daemon.take() {
            warn!(target: LIFECYCLE_TARGET, node_id = %daemon.node_id, "killing daemon left running");
            reap(&mut daemon.child);
        }
    }
}

fn reap(child: &mut Child) {
    if let Err(error) = child.kill().and_then(|()| child.wait().map(drop)) {
        warn!(target: LIFECYCLE_TARGET, pid = child.id(), %error, "failed to reap daemon");
    }
}
