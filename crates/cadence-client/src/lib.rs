//! Client side of a local DTN daemon.
//!
//! The daemon exposes an HTTP control API for endpoint registration and peer
//! listing, and a WebSocket stream that carries CBOR-encoded bundles once it
//! has been switched into data mode. This crate wraps both behind
//! [`ConvergenceClient`] and supervises the daemon process itself through
//! [`DaemonManager`].

pub mod bundle;
mod client;
pub mod control;
pub mod lifecycle;
pub mod session;
pub mod transport;

#[cfg(test)]
mod tests;

pub use bundle::{Bundle, CodecError, DEFAULT_BUNDLE_LIFETIME_MS, ReceivedBundle};
pub use client::{BundleHandler, ClientError, ConvergenceClient, DEFAULT_UNREGISTER_TIMEOUT};
pub use control::{ControlApi, ControlError, PeerSet};
pub use lifecycle::{
    DEFAULT_SETTLE_TIME, DEFAULT_STOP_TIMEOUT, DaemonLaunch, DaemonManager, LifecycleError,
    StopOutcome,
};
pub use session::SessionState;
pub use transport::{TransportError, TransportHandle};
