//! Bundle records and their CBOR wire encoding.
//!
//! Each binary WebSocket frame carries exactly one bundle encoded as a CBOR
//! map keyed by field name. Outbound bundles carry the full submission
//! record; inbound bundles add the daemon-assigned `bid`. Keys the daemon adds
//! beyond the known fields are ignored when decoding.

use std::borrow::Cow;

pub use cadence_config::DEFAULT_BUNDLE_LIFETIME_MS;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bundle submitted to the daemon for forwarding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    /// Source endpoint URI.
    pub src: String,
    /// Destination endpoint URI.
    pub dst: String,
    /// Whether the daemon should report delivery.
    pub delivery_notification: bool,
    /// Lifetime in milliseconds.
    pub lifetime: u64,
    /// Payload bytes, encoded as a CBOR byte string.
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

impl Bundle {
    /// Builds a bundle without delivery notification.
    #[must_use]
    pub fn new(src: impl Into<String>, dst: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            delivery_notification: false,
            lifetime: DEFAULT_BUNDLE_LIFETIME_MS,
            data: data.into(),
        }
    }

    /// Replaces the bundle lifetime.
    #[must_use]
    pub fn with_lifetime(mut self, lifetime_ms: u64) -> Self {
        self.lifetime = lifetime_ms;
        self
    }
}

/// Bundle delivered by the daemon to a subscribed endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReceivedBundle {
    /// Daemon-assigned bundle identifier.
    pub bid: String,
    /// Source endpoint URI.
    pub src: String,
    /// Destination endpoint URI.
    pub dst: String,
    /// Payload bytes.
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

impl ReceivedBundle {
    /// Payload decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }
}

/// Errors raised while encoding or decoding bundle frames.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Serialising a bundle failed.
    #[error("failed to encode bundle: {0}")]
    Encode(#[from] ciborium::ser::Error<std::io::Error>),
    /// A frame did not hold a well-formed bundle map.
    #[error("failed to decode bundle: {0}")]
    Decode(#[from] ciborium::de::Error<std::io::Error>),
}

/// Encodes a bundle into a single binary frame.
pub fn encode_bundle(bundle: &Bundle) -> Result<Vec<u8>, CodecError> {
    let mut frame = Vec::new();
    ciborium::ser::into_writer(bundle, &mut frame)?;
    Ok(frame)
}

/// Decodes an outbound-shaped bundle from a binary frame.
pub fn decode_bundle(frame: &[u8]) -> Result<Bundle, CodecError> {
    Ok(ciborium::de::from_reader(frame)?)
}

/// Decodes a bundle delivered by the daemon.
pub fn decode_received(frame: &[u8]) -> Result<ReceivedBundle, CodecError> {
    Ok(ciborium::de::from_reader(frame)?)
}
