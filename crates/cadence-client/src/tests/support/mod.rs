//! Shared fixtures for client tests.

mod fake_daemon;

use std::time::{Duration, Instant};

pub(in crate::tests) use fake_daemon::{FakeDaemon, FakeDaemonOptions};

/// Polls `condition` until it holds or `timeout` elapses.
pub(in crate::tests) fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}
