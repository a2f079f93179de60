//! Error types for the node runtime.

use std::sync::Arc;

use cadence_client::ClientError;
use thiserror::Error;

use crate::schedule::ScheduleError;
use crate::telemetry::TelemetryError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error("failed to prepare daemon client: {0}")]
    Client(#[from] ClientError),
}
