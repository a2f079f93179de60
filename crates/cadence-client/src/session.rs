//! Session state for one endpoint subscription.
//!
//! The stream speaks a small text protocol before bundles flow: the client
//! switches the connection into data mode, then subscribes to its endpoint.
//! [`Session`] is the pure state machine behind that exchange. It consumes
//! transport events and returns the [`Step`] the client must perform, which
//! keeps the protocol testable without a socket.

use std::fmt;

use tracing::{debug, error, info};

use crate::transport::{Frame, TransportEvent};

const SESSION_TARGET: &str = "cadence::client";

/// Command switching the stream into binary data mode.
pub const DATA_MODE_COMMAND: &str = "/data";
/// Reply confirming data mode.
pub const DATA_MODE_REPLY: &str = "200 tx mode: data";
/// Reply confirming an endpoint subscription.
pub const SUBSCRIBED_REPLY: &str = "200 subscribed";
/// Prefix shared by all successful control replies.
pub const SUCCESS_PREFIX: &str = "200";

/// Lifecycle of the stream subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No stream connection exists.
    #[default]
    Disconnected,
    /// The stream is being opened.
    Connecting,
    /// Waiting for data mode to be confirmed.
    ModeNegotiating,
    /// Waiting for the subscription to be confirmed.
    Subscribing,
    /// Bundles may be sent and received.
    Ready,
    /// The stream is being shut down.
    Closing,
}

impl SessionState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::ModeNegotiating => "mode-negotiating",
            Self::Subscribing => "subscribing",
            Self::Ready => "ready",
            Self::Closing => "closing",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Action the client performs after the session consumed an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Step {
    /// Nothing to do.
    Idle,
    /// Send this control text on the stream.
    Send(String),
    /// Decode this frame and hand it to the endpoint handler.
    Deliver(Vec<u8>),
    /// The daemon reported an error reply.
    DaemonError(String),
    /// The stream failed while reading.
    Failed(String),
}

#[derive(Debug, Default)]
pub(crate) struct Session {
    state: SessionState,
    endpoint: String,
}

impl Session {
    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn begin(&mut self, endpoint: &str) {
        endpoint.clone_into(&mut self.endpoint);
        self.state = SessionState::Connecting;
    }

    pub(crate) fn set_closing(&mut self) {
        self.state = SessionState::Closing;
    }

    pub(crate) fn reset(&mut self) {
        self.state = SessionState::Disconnected;
        self.endpoint.clear();
    }

    pub(crate) fn handle(&mut self, event: TransportEvent) -> Step {
        match event {
            TransportEvent::Opened => {
                info!(target: SESSION_TARGET, "stream opened; requesting data mode");
                self.state = SessionState::ModeNegotiating;
                Step::Send(String::from(DATA_MODE_COMMAND))
            }
            TransportEvent::Frame(Frame::Text(text)) => self.handle_text(&text),
            TransportEvent::Frame(Frame::Binary(payload)) => self.handle_binary(payload),
            TransportEvent::Closed => {
                info!(target: SESSION_TARGET, "stream closed");
                self.state = SessionState::Disconnected;
                Step::Idle
            }
            TransportEvent::Failed(failure) => {
                self.state = SessionState::Disconnected;
                Step::Failed(failure.to_string())
            }
        }
    }

    fn handle_text(&mut self, text: &str) -> Step {
        if self.state == SessionState::ModeNegotiating && text == DATA_MODE_REPLY {
            info!(target: SESSION_TARGET, "data mode confirmed");
            self.state = SessionState::Subscribing;
            return Step::Send(format!("/subscribe {}", self.endpoint));
        }
        if self.state == SessionState::Subscribing && text == SUBSCRIBED_REPLY {
            info!(target: SESSION_TARGET, endpoint = %self.endpoint, "subscribed");
            self.state = SessionState::Ready;
            return Step::Idle;
        }
        if text.starts_with(SUCCESS_PREFIX) {
            info!(target: SESSION_TARGET, reply = text, "control reply");
            return Step::Idle;
        }
        if self.state != SessionState::Ready {
            debug!(
                target: SESSION_TARGET,
                reply = text,
                state = %self.state,
                "unexpected reply ignored"
            );
            return Step::Idle;
        }
        error!(target: SESSION_TARGET, reply = text, "daemon reported an error");
        Step::DaemonError(text.to_owned())
    }

    fn handle_binary(&self, payload: Vec<u8>) -> Step {
        if self.state == SessionState::Ready {
            return Step::Deliver(payload);
        }
        debug!(
            target: SESSION_TARGET,
            state = %self.state,
            bytes = payload.len(),
            "binary frame ignored outside ready state"
        );
        Step::Idle
    }
}
