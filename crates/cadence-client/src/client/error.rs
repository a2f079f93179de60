//! Errors surfaced by the convergence client.

use thiserror::Error;

use crate::bundle::CodecError;
use crate::control::ControlError;
use crate::session::SessionState;
use crate::transport::TransportError;

/// Errors raised by [`super::ConvergenceClient`] operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// An endpoint is already registered on this client.
    #[error("endpoint '{endpoint}' is already registered")]
    AlreadyRegistered {
        /// Endpoint holding the registration.
        endpoint: String,
    },
    /// No endpoint is registered on this client.
    #[error("no endpoint is registered")]
    NotRegistered,
    /// The stream is not ready to carry bundles.
    #[error("bundle stream is not ready (state: {state})")]
    NotReady {
        /// Session state at the time of the call.
        state: SessionState,
    },
    /// A control API call failed.
    #[error(transparent)]
    Control(#[from] ControlError),
    /// The stream transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A bundle could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The delivery thread could not be started.
    #[error("failed to start delivery thread: {0}")]
    Delivery(#[source] std::io::Error),
}
