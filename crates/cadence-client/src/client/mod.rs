//! Convergence-layer client bound to one local daemon.
//!
//! A [`ConvergenceClient`] registers a single application endpoint with the
//! daemon over HTTP, opens the bundle stream, and walks the data-mode and
//! subscription handshake on the transport's receive line. Bundles received
//! once the subscription is live are decoded on the receive line and queued
//! on a bounded channel; a delivery thread drains that channel and runs the
//! endpoint handler, so a slow handler never stalls frame reads beyond the
//! channel's capacity.

mod error;

use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cadence_config::DaemonApi;
use tracing::{debug, error, info, warn};

pub use self::error::ClientError;
use crate::bundle::{Bundle, ReceivedBundle, decode_received, encode_bundle};
use crate::control::{ControlApi, PeerSet};
use crate::session::{Session, SessionState, Step};
use crate::transport::{ReceiveLine, TransportEvent, TransportHandle, join_within};

const CLIENT_TARGET: &str = "cadence::client";
const UNSUBSCRIBE_GRACE: Duration = Duration::from_millis(500);

/// Default time allowed for the stream to wind down on unregister.
pub const DEFAULT_UNREGISTER_TIMEOUT: Duration = Duration::from_secs(2);

/// Receives bundles delivered to a registered endpoint.
///
/// Handlers run on the client's delivery thread, one bundle at a time, in
/// arrival order.
pub trait BundleHandler: Send + 'static {
    /// Handles one delivered bundle.
    fn handle(&mut self, bundle: ReceivedBundle);
}

impl<F> BundleHandler for F
where
    F: FnMut(ReceivedBundle) + Send + 'static,
{
    fn handle(&mut self, bundle: ReceivedBundle) {
        self(bundle);
    }
}

struct Registration {
    endpoint: String,
    transport: TransportHandle,
    receive_line: ReceiveLine,
    delivery: JoinHandle<()>,
}

/// Client for one daemon's control API and bundle stream.
pub struct ConvergenceClient {
    control: ControlApi,
    node_id: String,
    delivery_capacity: usize,
    session: Arc<Mutex<Session>>,
    registration: Option<Registration>,
}

impl std::fmt::Debug for ConvergenceClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ConvergenceClient")
            .field("api", self.control.api())
            .field("node_id", &self.node_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ConvergenceClient {
    /// Builds a client for the daemon at `api` acting as `node_id`.
    ///
    /// `delivery_capacity` bounds the number of decoded bundles waiting for
    /// the handler; a capacity of zero is treated as one.
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be built.
    pub fn new(
        api: DaemonApi,
        node_id: impl Into<String>,
        delivery_capacity: usize,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            control: ControlApi::new(api)?,
            node_id: node_id.into(),
            delivery_capacity: delivery_capacity.max(1),
            session: Arc::new(Mutex::new(Session::default())),
            registration: None,
        })
    }

    /// Current subscription state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        lock(&self.session).state()
    }

    /// Endpoint currently registered, if any.
    #[must_use]
    pub fn registered_endpoint(&self) -> Option<&str> {
        self.registration
            .as_ref()
            .map(|registration| registration.endpoint.as_str())
    }

    /// Registers `endpoint` and opens the bundle stream.
    ///
    /// Returns once the stream is open; the data-mode and subscription
    /// handshake completes asynchronously, so callers observe
    /// [`SessionState::Ready`] shortly afterwards.
    ///
    /// # Errors
    ///
    /// Fails without side effects when an endpoint is already registered.
    /// Fails when the daemon refuses the registration or the stream cannot
    /// be opened; the session is left disconnected in both cases.
    pub fn register<H>(&mut self, endpoint: &str, handler: H) -> Result<(), ClientError>
    where
        H: BundleHandler,
    {
        if let Some(active) = &self.registration {
            warn!(
                target: CLIENT_TARGET,
                active = %active.endpoint,
                requested = endpoint,
                "endpoint already registered"
            );
            return Err(ClientError::AlreadyRegistered {
                endpoint: active.endpoint.clone(),
            });
        }

        let reply = self.control.register(endpoint).inspect_err(|error| {
            error!(target: CLIENT_TARGET, endpoint, %error, "registration failed");
        })?;
        info!(target: CLIENT_TARGET, endpoint, reply = %reply, "endpoint registered");

        lock(&self.session).begin(endpoint);
        match self.open_stream(handler) {
            Ok((transport, receive_line, delivery)) => {
                self.registration = Some(Registration {
                    endpoint: endpoint.to_owned(),
                    transport,
                    receive_line,
                    delivery,
                });
                Ok(())
            }
            Err(error) => {
                lock(&self.session).reset();
                error!(target: CLIENT_TARGET, endpoint, %error, "failed to open bundle stream");
                Err(error)
            }
        }
    }

    fn open_stream<H>(
        &self,
        handler: H,
    ) -> Result<(TransportHandle, ReceiveLine, JoinHandle<()>), ClientError>
    where
        H: BundleHandler,
    {
        let url = self
            .control
            .api()
            .stream_url()
            .map_err(crate::control::ControlError::from)?;
        let (sender, receiver) = mpsc::sync_channel(self.delivery_capacity);
        let delivery = spawn_delivery(receiver, handler)?;
        let session = Arc::clone(&self.session);
        let (transport, receive_line) = TransportHandle::open(&url, move |transport, event| {
            on_transport_event(&session, &sender, transport, event);
        })?;
        Ok((transport, receive_line, delivery))
    }

    /// Unsubscribes, closes the stream, and unregisters `endpoint`.
    ///
    /// When the subscription is live an unsubscribe command is sent first and
    /// given a short grace period. The receive line and delivery thread are
    /// each given up to `timeout` to finish before the HTTP unregistration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotRegistered`] without contacting the daemon
    /// when nothing is registered, or the control error when the daemon does
    /// not confirm the unregistration.
    pub fn unregister(&mut self, endpoint: &str, timeout: Duration) -> Result<(), ClientError> {
        let Some(registration) = self.registration.take() else {
            warn!(target: CLIENT_TARGET, endpoint, "unregister requested with no registration");
            return Err(ClientError::NotRegistered);
        };
        if registration.endpoint != endpoint {
            warn!(
                target: CLIENT_TARGET,
                active = %registration.endpoint,
                requested = endpoint,
                "unregistering a different endpoint than the one subscribed"
            );
        }

        if self.state() == SessionState::Ready {
            let uri = format!("dtn://{}/{}", self.node_id, endpoint);
            match registration.transport.send_text(format!("/unsubscribe {uri}")) {
                Ok(()) => thread::sleep(UNSUBSCRIBE_GRACE),
                Err(error) => {
                    warn!(target: CLIENT_TARGET, %error, "failed to send unsubscribe");
                }
            }
        }

        lock(&self.session).set_closing();
        registration.transport.close();
        if !registration.receive_line.join_within(timeout) {
            warn!(target: CLIENT_TARGET, ?timeout, "receive line did not stop in time");
        }
        if !join_within(registration.delivery, timeout) {
            warn!(target: CLIENT_TARGET, ?timeout, "delivery thread did not stop in time");
        }
        lock(&self.session).reset();

        let reply = self.control.unregister(endpoint).inspect_err(|error| {
            error!(target: CLIENT_TARGET, endpoint, %error, "unregistration failed");
        })?;
        info!(target: CLIENT_TARGET, endpoint, reply = %reply, "endpoint unregistered");
        Ok(())
    }

    /// Sends one bundle on the stream.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotReady`] unless the subscription is live;
    /// nothing is transmitted in that case.
    pub fn send_bundle(
        &self,
        src: &str,
        dst: &str,
        data: &[u8],
        lifetime_ms: u64,
    ) -> Result<(), ClientError> {
        let state = self.state();
        let Some(registration) = self.registration.as_ref().filter(|_| state == SessionState::Ready)
        else {
            warn!(target: CLIENT_TARGET, %state, dst, "bundle stream not ready; bundle dropped");
            return Err(ClientError::NotReady { state });
        };
        let bundle = Bundle::new(src, dst, data).with_lifetime(lifetime_ms);
        let frame = encode_bundle(&bundle)?;
        registration.transport.send_binary(frame).inspect_err(|error| {
            error!(target: CLIENT_TARGET, dst, %error, "failed to send bundle");
        })?;
        debug!(target: CLIENT_TARGET, src, dst, bytes = data.len(), "bundle sent");
        Ok(())
    }

    /// Peers currently known to the daemon.
    ///
    /// Failures are logged and reported as an empty set.
    #[must_use]
    pub fn get_peers(&self) -> PeerSet {
        self.control.peers().unwrap_or_else(|error| {
            error!(target: CLIENT_TARGET, %error, "failed to fetch peers");
            PeerSet::new()
        })
    }
}

impl Drop for ConvergenceClient {
    fn drop(&mut self) {
        if let Some(registration) = self.registration.take() {
            registration.transport.close();
        }
    }
}

fn lock(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

fn spawn_delivery<H>(
    receiver: Receiver<ReceivedBundle>,
    mut handler: H,
) -> Result<JoinHandle<()>, ClientError>
where
    H: BundleHandler,
{
    thread::Builder::new()
        .name(String::from("cadence-delivery"))
        .spawn(move || {
            for bundle in receiver {
                handler.handle(bundle);
            }
        })
        .map_err(ClientError::Delivery)
}

fn on_transport_event(
    session: &Mutex<Session>,
    deliveries: &SyncSender<ReceivedBundle>,
    transport: &TransportHandle,
    event: TransportEvent,
) {
    let step = lock(session).handle(event);
    match step {
        Step::Idle => {}
        Step::DaemonError(reply) => {
            debug!(target: CLIENT_TARGET, %reply, "error reply left session unchanged");
        }
        Step::Send(command) => {
            if let Err(error) = transport.send_text(command.as_str()) {
                error!(target: CLIENT_TARGET, command, %error, "failed to send control command");
            }
        }
        Step::Deliver(frame) => deliver(deliveries, &frame),
        Step::Failed(reason) => {
            error!(target: CLIENT_TARGET, reason, "bundle stream failed");
        }
    }
}

fn deliver(deliveries: &SyncSender<ReceivedBundle>, frame: &[u8]) {
    let bundle = match decode_received(frame) {
        Ok(bundle) => bundle,
        Err(error) => {
            error!(target: CLIENT_TARGET, %error, bytes = frame.len(), "dropping undecodable frame");
            return;
        }
    };
    debug!(target: CLIENT_TARGET, bid = %bundle.bid, src = %bundle.src, "bundle received");
    match deliveries.try_send(bundle) {
        Ok(()) => {}
        Err(TrySendError::Full(bundle)) => {
            debug!(target: CLIENT_TARGET, "delivery queue full; waiting for handler");
            if deliveries.send(bundle).is_err() {
                warn!(target: CLIENT_TARGET, "delivery thread has stopped");
            }
        }
        Err(TrySendError::Disconnected(_)) => {
            warn!(target: CLIENT_TARGET, "delivery thread has stopped");
        }
    }
}
