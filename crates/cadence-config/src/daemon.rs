use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Path of the daemon's streaming bundle channel.
pub const STREAM_PATH: &str = "/ws";

/// Address of the daemon's control API.
///
/// The daemon serves its HTTP endpoints and the WebSocket bundle channel on
/// the same host and port, so one address yields both URL families.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DaemonApi {
    host: String,
    port: u16,
}

impl DaemonApi {
    /// Builds an API address from a host and port.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host serving the API.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port serving the API.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Builds an HTTP URL for `path`, attaching `query` verbatim.
    ///
    /// The daemon reads bare query strings such as `/register?scheduled`
    /// rather than key/value pairs.
    pub fn http_url(&self, path: &str, query: Option<&str>) -> Result<Url, DaemonApiError> {
        let mut url = self.base("http")?.join(path)?;
        url.set_query(query);
        Ok(url)
    }

    /// URL of the WebSocket bundle channel.
    pub fn stream_url(&self) -> Result<Url, DaemonApiError> {
        Ok(self.base("ws")?.join(STREAM_PATH)?)
    }

    fn base(&self, scheme: &str) -> Result<Url, DaemonApiError> {
        let text = format!("{scheme}://{}:{}/", self.host, self.port);
        Ok(Url::parse(&text)?)
    }
}

impl fmt::Display for DaemonApi {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.host, self.port)
    }
}

impl FromStr for DaemonApi {
    type Err = DaemonApiError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(&format!("http://{input}"))?;
        let host = url
            .host_str()
            .ok_or_else(|| DaemonApiError::MissingHost(input.to_owned()))?;
        let port = url
            .port()
            .ok_or_else(|| DaemonApiError::MissingPort(input.to_owned()))?;
        Ok(Self::new(host, port))
    }
}

/// Errors encountered while building daemon API addresses.
#[derive(Debug, Error)]
pub enum DaemonApiError {
    /// Host name was missing.
    #[error("missing daemon host in '{0}'")]
    MissingHost(String),
    /// Port was missing from the address.
    #[error("missing daemon port in '{0}'")]
    MissingPort(String),
    /// URL failed to parse.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}
