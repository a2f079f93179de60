//! Schedule scripts and their execution.
//!
//! - [`parse`] turns a script into an ordered [`Schedule`].
//! - [`runner`] replays a schedule against a [`NodeControl`] on a [`Clock`].

mod parse;
mod runner;
#[cfg(test)]
mod runner_tests;

pub use parse::{Action, Schedule, ScheduleError, ScheduledCommand, load_schedule, parse_schedule};
pub use runner::{Clock, MonotonicClock, NodeControl, Scheduler};

pub(crate) const SCHEDULER_TARGET: &str = "cadence::scheduler";
