//! Replay of a schedule against a node.
//!
//! The [`Scheduler`] walks the commands in offset order, sleeping until each
//! offset is reached on its [`Clock`], then waits out the remaining lifetime.
//! Whatever happens during the walk, including a panic inside a command,
//! teardown unregisters the endpoint and stops the daemon before the run
//! returns.

use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::SCHEDULER_TARGET;
use super::parse::{Action, Schedule, ScheduledCommand};

/// Operations the scheduler performs on the local node.
///
/// Each method reports success as a boolean; failures are logged by the
/// implementation and never abort the run.
#[cfg_attr(test, mockall::automock)]
pub trait NodeControl {
    /// Starts the daemon.
    fn start_daemon(&mut self) -> bool;
    /// Stops the daemon.
    fn stop_daemon(&mut self) -> bool;
    /// Registers the application endpoint and opens the bundle stream.
    fn register_endpoint(&mut self) -> bool;
    /// Closes the bundle stream and unregisters the endpoint.
    fn unregister_endpoint(&mut self) -> bool;
    /// Peers currently known to the daemon.
    fn peers(&self) -> BTreeSet<String>;
    /// Sends `payload` to the endpoint on `peer`.
    fn send_message(&self, peer: &str, payload: &[u8]) -> bool;
}

/// Monotonic time source used to pace the schedule.
pub trait Clock {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;
    /// Blocks for `duration`.
    fn sleep(&self, duration: Duration);
}

/// [`Clock`] backed by [`Instant`] and [`thread::sleep`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Creates a clock whose origin is now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Drives a node through a schedule.
#[derive(Debug)]
pub struct Scheduler<N, C = MonotonicClock> {
    node: N,
    clock: C,
    node_id: String,
    daemon_running: bool,
    endpoint_registered: bool,
}

impl<N, C> Scheduler<N, C>
where
    N: NodeControl,
    C: Clock,
{
    /// Creates a scheduler acting as `node_id`.
    #[must_use]
    pub fn new(node: N, clock: C, node_id: impl Into<String>) -> Self {
        Self {
            node,
            clock,
            node_id: node_id.into(),
            daemon_running: false,
            endpoint_registered: false,
        }
    }

    /// Runs every command, waits out the lifetime, then tears down.
    ///
    /// A panic raised by a command is re-raised after teardown.
    pub fn run(&mut self, schedule: &Schedule) {
        info!(
            target: SCHEDULER_TARGET,
            node_id = %self.node_id,
            commands = schedule.commands().len(),
            lifetime_secs = ?schedule.lifetime_secs(),
            "schedule started"
        );
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.execute(schedule)));
        self.teardown();
        if let Err(payload) = outcome {
            panic::resume_unwind(payload);
        }
        info!(target: SCHEDULER_TARGET, node_id = %self.node_id, "schedule finished");
    }

    /// Releases the node.
    #[must_use]
    pub fn into_node(self) -> N {
        self.node
    }

    fn execute(&mut self, schedule: &Schedule) {
        let start = self.clock.now();
        for command in schedule.commands() {
            self.wait_until(start, Duration::from_secs(command.offset));
            self.dispatch(*command);
        }
        if let Some(lifetime) = schedule.lifetime() {
            self.wait_until(start, lifetime);
        }
    }

    fn wait_until(&self, start: Duration, offset: Duration) {
        let elapsed = self.clock.now().saturating_sub(start);
        if let Some(remaining) = offset.checked_sub(elapsed).filter(|d| !d.is_zero()) {
            self.clock.sleep(remaining);
        }
    }

    fn dispatch(&mut self, command: ScheduledCommand) {
        let offset = command.offset;
        match command.action {
            Action::Connect => self.connect(offset),
            Action::Disconnect => self.disconnect(offset),
            Action::Message => self.message(offset),
        }
    }

    fn connect(&mut self, offset: u64) {
        if self.daemon_running {
            warn!(target: SCHEDULER_TARGET, offset, "[T+{offset}s] CONNECT ignored; daemon already running");
            return;
        }
        info!(target: SCHEDULER_TARGET, offset, "[T+{offset}s] starting DTN daemon");
        if !self.node.start_daemon() {
            return;
        }
        self.daemon_running = true;
        if self.node.register_endpoint() {
            self.endpoint_registered = true;
        }
    }

    fn disconnect(&mut self, offset: u64) {
        if !self.daemon_running {
            warn!(target: SCHEDULER_TARGET, offset, "[T+{offset}s] DISCONNECT ignored; daemon not running");
            return;
        }
        info!(target: SCHEDULER_TARGET, offset, "[T+{offset}s] stopping DTN daemon");
        if self.endpoint_registered {
            self.node.unregister_endpoint();
            self.endpoint_registered = false;
        }
        if self.node.stop_daemon() {
            self.daemon_running = false;
        }
    }

    fn message(&mut self, offset: u64) {
        if !self.daemon_running {
            warn!(target: SCHEDULER_TARGET, offset, "[T+{offset}s] MESSAGE skipped; daemon not running");
            return;
        }
        let peers = self.node.peers();
        if peers.is_empty() {
            warn!(target: SCHEDULER_TARGET, offset, "[T+{offset}s] MESSAGE skipped; no peers known");
            return;
        }
        let payload = format!("Hello from {} at {offset}", self.node_id);
        for peer in &peers {
            info!(target: SCHEDULER_TARGET, offset, peer = %peer, "[T+{offset}s] sending message");
            self.node.send_message(peer, payload.as_bytes());
        }
    }

    fn teardown(&mut self) {
        if self.endpoint_registered {
            self.node.unregister_endpoint();
            self.endpoint_registered = false;
        }
        if self.daemon_running {
            self.node.stop_daemon();
            self.daemon_running = false;
        }
    }
}
