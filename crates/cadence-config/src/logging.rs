use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Supported console logging formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// Human-readable single line output, matching what experiment operators
    /// tail while a scenario runs.
    #[default]
    Compact,
    /// Structured JSON suitable for post-run ingestion.
    Json,
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;
