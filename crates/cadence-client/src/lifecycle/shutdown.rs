//! Daemon signalling and termination.

use std::process::Child;
use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::{debug, warn};

use super::LIFECYCLE_TARGET;
use super::error::LifecycleError;

/// How a stopped daemon exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The daemon exited after the termination request.
    Graceful,
    /// The daemon ignored the request and was killed.
    Forced,
}

/// Sends `signal` to `pid`.
///
/// A pid of zero or one that does not fit a `pid_t` is refused, since
/// `kill(2)` would address a process group instead of the daemon.
pub(super) fn signal_daemon(pid: u32, signal: Signal) -> Result<(), LifecycleError> {
    if pid == 0 {
        return Err(LifecycleError::InvalidPid {
            pid,
            message: String::from("pid 0 addresses the caller's process group"),
        });
    }
    let raw = i32::try_from(pid).map_err(|_| LifecycleError::InvalidPid {
        pid,
        message: String::from("pid exceeds the platform range"),
    })?;
    signal::kill(Pid::from_raw(raw), signal)
        .map_err(|source| LifecycleError::SignalFailed { pid, source })
}

/// Requests termination and escalates to a kill after `timeout`.
pub(super) fn terminate(
    child: &mut Child,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<StopOutcome, LifecycleError> {
    let pid = child.id();
    match signal_daemon(pid, Signal::SIGTERM) {
        Ok(()) => {}
        Err(LifecycleError::SignalFailed {
            source: Errno::ESRCH,
            ..
        }) => debug!(target: LIFECYCLE_TARGET, pid, "daemon already gone before SIGTERM"),
        Err(error) => return Err(error),
    }

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child
            .try_wait()
            .map_err(|source| LifecycleError::MonitorChild { source })?
        {
            debug!(target: LIFECYCLE_TARGET, pid, %status, "daemon exited");
            return Ok(StopOutcome::Graceful);
        }
        if Instant::now() >= deadline {
            break;
        }
        thread::sleep(poll_interval);
    }

    warn!(target: LIFECYCLE_TARGET, pid, ?timeout, "daemon ignored SIGTERM; killing");
    child
        .kill()
        .and_then(|()| child.wait())
        .map_err(|source| LifecycleError::KillFailed { pid, source })?;
    Ok(StopOutcome::Forced)
}
