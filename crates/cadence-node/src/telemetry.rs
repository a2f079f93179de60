//! Structured telemetry initialisation for the node.
//!
//! Two sinks are installed: a console layer on stderr, filtered and
//! formatted per configuration, and a plain-text file layer that records
//! everything at debug level into `{results_dir}/{hostname}.log` for later
//! analysis of the experiment.

use std::fs::{self, File};
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use cadence_config::{Config, LogFormat, host_node_id};
use once_cell::sync::OnceCell;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::warn;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

const TELEMETRY_TARGET: &str = "cadence::node";

static TELEMETRY_GUARD: OnceCell<TelemetryHandle> = OnceCell::new();

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Default, Clone)]
pub struct TelemetryHandle {
    log_file: Option<PathBuf>,
}

impl TelemetryHandle {
    /// Path of the per-host log file, when one could be opened.
    #[must_use]
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(#[source] SetGlobalDefaultError),
}

/// Configures the global tracing subscriber when invoked for the first time.
///
/// Repeated calls return the handle from the first installation. A log file
/// that cannot be created does not prevent console logging; the failure is
/// reported as a warning once the subscriber is live.
///
/// # Errors
///
/// Fails when the filter expression is invalid or another global subscriber
/// is already installed.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(config))
        .cloned()
}

fn install_subscriber(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;

    let log_path = config
        .results_dir()
        .join(format!("{}.log", host_node_id()));
    let (log_layer, log_error) = match open_log_file(&log_path) {
        Ok(file) => (Some(file_layer(file)), None),
        Err(error) => (None, Some(error)),
    };

    let mut layers: Vec<BoxedLayer> = vec![console_layer(config.log_format(), filter)];
    layers.extend(log_layer);
    let subscriber = tracing_subscriber::registry().with(layers);
    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)?;

    let Some(error) = log_error else {
        return Ok(TelemetryHandle {
            log_file: Some(log_path),
        });
    };
    warn!(
        target: TELEMETRY_TARGET,
        path = %log_path.display(),
        %error,
        "log file unavailable; logging to console only"
    );
    Ok(TelemetryHandle { log_file: None })
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    File::options().create(true).append(true).open(path)
}

fn console_layer(format: LogFormat, filter: EnvFilter) -> BoxedLayer {
    let layer = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_thread_names(true)
        .with_writer(io::stderr)
        // Keep colour on interactive terminals only.
        .with_ansi(io::stderr().is_terminal())
        .with_timer(UtcTime::rfc_3339());
    match format {
        LogFormat::Json => layer
            .json()
            .flatten_event(true)
            .with_filter(filter)
            .boxed(),
        LogFormat::Compact => layer.compact().with_filter(filter).boxed(),
    }
}

fn file_layer(file: File) -> BoxedLayer {
    fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_thread_names(true)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .with_timer(UtcTime::rfc_3339())
        .with_filter(LevelFilter::DEBUG)
        .boxed()
}
