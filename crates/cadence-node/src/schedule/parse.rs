//! Parsing of schedule scripts.
//!
//! A script holds one `<offset> <TOKEN>` pair per line, where the offset is
//! whole seconds from the start of the run. Blank lines and lines starting
//! with `#` are ignored. Malformed lines are logged and skipped rather than
//! aborting the run, so one typo does not cost a whole experiment.

use std::fs;
use std::num::ParseIntError;
use std::path::{Path, PathBuf};
use std::time::Duration;

use strum::{Display, EnumString};
use thiserror::Error;
use tracing::warn;

use super::SCHEDULER_TARGET;

const LIFETIME_TOKEN: &str = "LIFETIME";

/// Action triggered at a scheduled offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Action {
    /// Start the daemon and register the endpoint.
    Connect,
    /// Unregister the endpoint and stop the daemon.
    Disconnect,
    /// Send a greeting to every known peer.
    Message,
}

/// One timed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledCommand {
    /// Seconds after the start of the run.
    pub offset: u64,
    /// Action to perform.
    pub action: Action,
}

/// Parsed schedule, ordered by offset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    lifetime: Option<u64>,
    commands: Vec<ScheduledCommand>,
}

impl Schedule {
    /// Total run duration in seconds, when the script sets one.
    #[must_use]
    pub const fn lifetime_secs(&self) -> Option<u64> {
        self.lifetime
    }

    /// Total run duration, when the script sets one.
    #[must_use]
    pub fn lifetime(&self) -> Option<Duration> {
        self.lifetime.map(Duration::from_secs)
    }

    /// Commands in ascending offset order; equal offsets keep script order.
    #[must_use]
    pub fn commands(&self) -> &[ScheduledCommand] {
        &self.commands
    }
}

/// Errors raised while loading a schedule.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// The script could not be read.
    #[error("failed to read schedule file {path:?}: {source}")]
    Read {
        /// Script path.
        path: PathBuf,
        /// Underlying read error.
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
enum LineError {
    #[error("expected '<offset> <action>' but found {found} fields")]
    FieldCount { found: usize },
    #[error("offset '{offset}' is not a non-negative whole number of seconds: {source}")]
    Offset {
        offset: String,
        #[source]
        source: ParseIntError,
    },
    #[error("unknown action '{token}'")]
    UnknownAction { token: String },
}

enum Entry {
    Lifetime(u64),
    Command(ScheduledCommand),
}

/// Reads and parses the script at `path`.
///
/// # Errors
///
/// Returns [`ScheduleError::Read`] when the file cannot be read. Malformed
/// lines never fail the load.
pub fn load_schedule(path: &Path) -> Result<Schedule, ScheduleError> {
    let source = fs::read_to_string(path).map_err(|source| ScheduleError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_schedule(&source))
}

/// Parses script text into a schedule.
///
/// When several `LIFETIME` lines appear the last one wins.
#[must_use]
pub fn parse_schedule(source: &str) -> Schedule {
    let mut schedule = Schedule::default();
    for (index, raw) in source.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_line(line) {
            Ok(Entry::Lifetime(offset)) => schedule.lifetime = Some(offset),
            Ok(Entry::Command(command)) => schedule.commands.push(command),
            Err(error) => warn!(
                target: SCHEDULER_TARGET,
                line = index + 1,
                content = line,
                %error,
                "skipping schedule line"
            ),
        }
    }
    schedule.commands.sort_by_key(|command| command.offset);
    schedule
}

fn parse_line(line: &str) -> Result<Entry, LineError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [offset, token] = fields.as_slice() else {
        return Err(LineError::FieldCount {
            found: fields.len(),
        });
    };
    let offset = offset.parse::<u64>().map_err(|source| LineError::Offset {
        offset: (*offset).to_owned(),
        source,
    })?;
    if *token == LIFETIME_TOKEN {
        return Ok(Entry::Lifetime(offset));
    }
    let action = token
        .parse::<Action>()
        .map_err(|_| LineError::UnknownAction {
            token: (*token).to_owned(),
        })?;
    Ok(Entry::Command(ScheduledCommand { offset, action }))
}
