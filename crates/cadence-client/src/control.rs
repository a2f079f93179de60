//! Blocking calls against the daemon's HTTP control API.

use std::collections::BTreeSet;

use cadence_config::{DaemonApi, DaemonApiError};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

const CONTROL_TARGET: &str = "cadence::client";

/// Identifiers of the peers the daemon currently knows.
pub type PeerSet = BTreeSet<String>;

/// Errors raised by control API calls.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The request address could not be built.
    #[error(transparent)]
    Address(#[from] DaemonApiError),
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    /// The request failed or returned an error status.
    #[error("request to {url} failed: {source}")]
    Request {
        /// Requested address.
        url: String,
        /// Underlying HTTP error.
        #[source]
        source: reqwest::Error,
    },
    /// The daemon answered without the expected confirmation.
    #[error("daemon rejected {operation}: {reply}")]
    Rejected {
        /// Control operation that was refused.
        operation: &'static str,
        /// Reply body returned by the daemon.
        reply: String,
    },
    /// The peer listing was not a JSON object.
    #[error("failed to parse peer listing: {0}")]
    Peers(#[source] serde_json::Error),
}

/// Client for the daemon's HTTP control surface.
#[derive(Debug, Clone)]
pub struct ControlApi {
    api: DaemonApi,
    http: reqwest::blocking::Client,
}

impl ControlApi {
    /// Builds a control client for `api`.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Client`] when the HTTP client cannot be built.
    pub fn new(api: DaemonApi) -> Result<Self, ControlError> {
        let http = reqwest::blocking::Client::builder()
            .build()
            .map_err(ControlError::Client)?;
        Ok(Self { api, http })
    }

    /// Daemon address this client talks to.
    #[must_use]
    pub fn api(&self) -> &DaemonApi {
        &self.api
    }

    /// Registers `endpoint` with the daemon and returns its reply.
    ///
    /// # Errors
    ///
    /// Fails when the request fails or the reply does not start with
    /// `Registered`.
    pub fn register(&self, endpoint: &str) -> Result<String, ControlError> {
        let reply = self.get_text("/register", Some(endpoint))?;
        expect_prefix("registration", "Registered", reply)
    }

    /// Unregisters `endpoint` and returns the daemon's reply.
    ///
    /// # Errors
    ///
    /// Fails when the request fails or the reply does not start with
    /// `Unregistered`.
    pub fn unregister(&self, endpoint: &str) -> Result<String, ControlError> {
        let reply = self.get_text("/unregister", Some(endpoint))?;
        expect_prefix("unregistration", "Unregistered", reply)
    }

    /// Fetches the identifiers of all known peers.
    ///
    /// # Errors
    ///
    /// Fails when the request fails or the body is not a JSON object.
    pub fn peers(&self) -> Result<PeerSet, ControlError> {
        let body = self.get_text("/status/peers", None)?;
        let listing: Map<String, Value> = serde_json::from_str(&body).map_err(ControlError::Peers)?;
        Ok(listing.into_iter().map(|(peer, _)| peer).collect())
    }

    fn get_text(&self, path: &str, query: Option<&str>) -> Result<String, ControlError> {
        let url = self.api.http_url(path, query)?;
        debug!(target: CONTROL_TARGET, url = %url, "control request");
        let request_error = |source| ControlError::Request {
            url: url.to_string(),
            source,
        };
        self.http
            .get(url.clone())
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .and_then(reqwest::blocking::Response::text)
            .map_err(request_error)
    }
}

fn expect_prefix(
    operation: &'static str,
    prefix: &str,
    reply: String,
) -> Result<String, ControlError> {
    if reply.starts_with(prefix) {
        Ok(reply)
    } else {
        Err(ControlError::Rejected { operation, reply })
    }
}
