//! Capture of the daemon's standard streams.
//!
//! Both pipes are drained on their own threads so the daemon never blocks on
//! a full pipe. Every line becomes a debug event; the most recent stderr
//! lines are also retained so start-up failures can be reported.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::process::Child;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use super::LIFECYCLE_TARGET;
use crate::transport::join_within;

const STDERR_TAIL_LINES: usize = 32;
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug)]
enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

#[derive(Debug)]
pub(super) struct DaemonOutput {
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    drains: Vec<JoinHandle<()>>,
}

impl DaemonOutput {
    /// Starts draining whichever pipes `child` exposes.
    pub(super) fn capture(child: &mut Child, node_id: &str) -> Self {
        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let mut drains = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            drains.extend(spawn_drain(stdout, Stream::Stdout, node_id, None));
        }
        if let Some(stderr) = child.stderr.take() {
            drains.extend(spawn_drain(
                stderr,
                Stream::Stderr,
                node_id,
                Some(Arc::clone(&stderr_tail)),
            ));
        }
        Self {
            stderr_tail,
            drains,
        }
    }

    /// Waits briefly for the pipes to close and returns the stderr tail.
    pub(super) fn finish(self) -> String {
        for drain in self.drains {
            if !join_within(drain, DRAIN_TIMEOUT) {
                debug!(target: LIFECYCLE_TARGET, "output drain still running");
            }
        }
        let tail = self
            .stderr_tail
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        tail.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

fn spawn_drain<R>(
    pipe: R,
    stream: Stream,
    node_id: &str,
    tail: Option<Arc<Mutex<VecDeque<String>>>>,
) -> Option<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    let node_id = node_id.to_owned();
    thread::Builder::new()
        .name(format!("cadence-daemon-{}", stream.as_str()))
        .spawn(move || drain(pipe, stream, &node_id, tail.as_deref()))
        .inspect_err(|error| {
            warn!(target: LIFECYCLE_TARGET, stream = stream.as_str(), %error, "daemon output not captured");
        })
        .ok()
}

fn drain<R: Read>(pipe: R, stream: Stream, node_id: &str, tail: Option<&Mutex<VecDeque<String>>>) {
    for line in BufReader::new(pipe).lines() {
        let Ok(line) = line else { break };
        debug!(target: LIFECYCLE_TARGET, node_id, stream = stream.as_str(), "{line}");
        if let Some(tail) = tail {
            let mut tail = tail.lock().unwrap_or_else(PoisonError::into_inner);
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    }
}
