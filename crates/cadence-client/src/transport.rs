//! Full-duplex WebSocket transport to the daemon's streaming endpoint.
//!
//! [`TransportHandle::open`] performs the WebSocket handshake and starts a
//! dedicated receive line: a named thread that reads frames and hands each
//! [`TransportEvent`] to a consumer closure in arrival order. The handle is
//! cheap to clone and safe to use from any thread for sending, so the
//! consumer can answer frames on the same connection while it runs.
//!
//! The socket is polled with a short read timeout so that a local
//! [`TransportHandle::close`] is observed promptly by the receive line.

use std::io;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};
use url::Url;

const TRANSPORT_TARGET: &str = "cadence::transport";
const READ_POLL: Duration = Duration::from_millis(50);
const JOIN_POLL: Duration = Duration::from_millis(10);

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// Payload of a data frame received from the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 control text.
    Text(String),
    /// Binary payload, one encoded bundle per frame.
    Binary(Vec<u8>),
}

/// Event observed by the receive line.
#[derive(Debug)]
pub enum TransportEvent {
    /// The connection is open and ready for traffic.
    Opened,
    /// A data frame arrived.
    Frame(Frame),
    /// The connection closed, locally or remotely.
    Closed,
    /// Reading failed; the connection is unusable.
    Failed(TransportError),
}

/// Errors raised by the WebSocket transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The handshake with the daemon failed.
    #[error("failed to open stream {url}: {source}")]
    Connect {
        /// Stream address that was dialled.
        url: String,
        /// Underlying WebSocket error.
        #[source]
        source: Box<tungstenite::Error>,
    },
    /// The read timeout could not be applied to the socket.
    #[error("failed to configure stream socket: {0}")]
    Configure(#[source] io::Error),
    /// The receive line could not be started.
    #[error("failed to start receive line: {0}")]
    Spawn(#[source] io::Error),
    /// The connection has already been closed.
    #[error("stream is closed")]
    Closed,
    /// Writing a frame failed.
    #[error("failed to send frame: {0}")]
    Send(#[source] Box<tungstenite::Error>),
    /// Reading a frame failed.
    #[error("failed to read frame: {0}")]
    Receive(#[source] Box<tungstenite::Error>),
}

struct Shared {
    socket: Mutex<Socket>,
    closed: AtomicBool,
}

/// Sending half of an open stream connection.
#[derive(Clone)]
pub struct TransportHandle {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for TransportHandle {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TransportHandle")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl TransportHandle {
    /// Opens the stream at `url` and starts the receive line.
    ///
    /// `consumer` runs on the receive line and sees [`TransportEvent::Opened`]
    /// first, then every frame in arrival order, and finally exactly one of
    /// [`TransportEvent::Closed`] or [`TransportEvent::Failed`].
    ///
    /// # Errors
    ///
    /// Returns an error when the handshake fails or the receive line cannot
    /// be spawned. The consumer is dropped without being called in that case.
    pub fn open<C>(url: &Url, consumer: C) -> Result<(Self, ReceiveLine), TransportError>
    where
        C: FnMut(&Self, TransportEvent) + Send + 'static,
    {
        let (socket, _response) =
            tungstenite::connect(url.as_str()).map_err(|source| TransportError::Connect {
                url: url.to_string(),
                source: Box::new(source),
            })?;
        if let MaybeTlsStream::Plain(stream) = socket.get_ref() {
            stream
                .set_read_timeout(Some(READ_POLL))
                .map_err(TransportError::Configure)?;
        }
        debug!(target: TRANSPORT_TARGET, url = %url, "stream connected");
        let handle = Self {
            shared: Arc::new(Shared {
                socket: Mutex::new(socket),
                closed: AtomicBool::new(false),
            }),
        };
        let line_handle = handle.clone();
        let thread = thread::Builder::new()
            .name(String::from("cadence-receive"))
            .spawn(move || receive_loop(&line_handle, consumer))
            .map_err(TransportError::Spawn)?;
        Ok((handle, ReceiveLine { thread }))
    }

    /// Sends a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] once the connection has closed, or
    /// [`TransportError::Send`] when the write fails.
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.send(Message::Text(text.into()))
    }

    /// Sends a binary frame.
    ///
    /// # Errors
    ///
    /// Same as [`TransportHandle::send_text`].
    pub fn send_binary(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        self.send(Message::Binary(payload))
    }

    /// Closes the connection. Calling this more than once has no effect.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut socket = self.lock();
        if let Err(error) = socket.close(None) {
            debug!(target: TRANSPORT_TARGET, %error, "close handshake not sent");
        }
        if let Err(error) = socket.flush() {
            debug!(target: TRANSPORT_TARGET, %error, "close frame not flushed");
        }
    }

    /// Reports whether the connection has closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    fn send(&self, message: Message) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.lock().send(message).map_err(|source| match source {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                TransportError::Closed
            }
            other => TransportError::Send(Box::new(other)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Socket> {
        self.shared
            .socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_closed(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
    }
}

/// Running receive line started by [`TransportHandle::open`].
#[derive(Debug)]
pub struct ReceiveLine {
    thread: JoinHandle<()>,
}

impl ReceiveLine {
    /// Waits up to `timeout` for the receive line to finish.
    ///
    /// Returns `false` when the line is still running at the deadline; the
    /// thread is then left detached.
    #[must_use]
    pub fn join_within(self, timeout: Duration) -> bool {
        join_within(self.thread, timeout)
    }
}

/// Joins `thread` if it finishes before `timeout` elapses.
pub(crate) fn join_within(thread: JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !thread.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(JOIN_POLL);
    }
    if thread.join().is_err() {
        warn!(target: TRANSPORT_TARGET, "joined thread had panicked");
    }
    true
}

enum ReadOutcome {
    Event(TransportEvent),
    Idle,
}

fn receive_loop<C>(handle: &TransportHandle, mut consumer: C)
where
    C: FnMut(&TransportHandle, TransportEvent),
{
    consumer(handle, TransportEvent::Opened);
    loop {
        if handle.is_closed() {
            consumer(handle, TransportEvent::Closed);
            break;
        }
        match read_once(handle) {
            ReadOutcome::Idle => {}
            ReadOutcome::Event(TransportEvent::Closed) => {
                handle.mark_closed();
                consumer(handle, TransportEvent::Closed);
                break;
            }
            ReadOutcome::Event(TransportEvent::Failed(error)) => {
                handle.mark_closed();
                consumer(handle, TransportEvent::Failed(error));
                break;
            }
            ReadOutcome::Event(event) => consumer(handle, event),
        }
    }
    debug!(target: TRANSPORT_TARGET, "receive line finished");
}

fn read_once(handle: &TransportHandle) -> ReadOutcome {
    let result = handle.lock().read();
    match result {
        Ok(Message::Text(text)) => ReadOutcome::Event(TransportEvent::Frame(Frame::Text(text))),
        Ok(Message::Binary(payload)) => ReadOutcome::Event(TransportEvent::Frame(Frame::Binary(payload))),
        Ok(Message::Close(_)) => ReadOutcome::Event(TransportEvent::Closed),
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => ReadOutcome::Idle,
        Err(tungstenite::Error::Io(error))
            if matches!(
                error.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ) =>
        {
            ReadOutcome::Idle
        }
        Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
            ReadOutcome::Event(TransportEvent::Closed)
        }
        Err(error) if handle.is_closed() => {
            debug!(target: TRANSPORT_TARGET, %error, "read failed after local close");
            ReadOutcome::Event(TransportEvent::Closed)
        }
        Err(error) => ReadOutcome::Event(TransportEvent::Failed(TransportError::Receive(Box::new(
            error,
        )))),
    }
}
