//! Fake daemon serving the HTTP control API and the bundle stream.
//!
//! Requests are told apart by peeking at the request line: `GET /ws` is
//! upgraded to a WebSocket, anything else is answered as a one-shot HTTP
//! request from the canned replies in [`FakeDaemonOptions`].

use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use cadence_config::DaemonApi;
use tungstenite::Message;

const POLL: Duration = Duration::from_millis(10);

/// Canned behaviour of the fake daemon.
#[derive(Clone, Debug)]
pub(in crate::tests) struct FakeDaemonOptions {
    pub register_reply: String,
    pub unregister_reply: String,
    pub peers_body: String,
    pub confirm_data_mode: bool,
    pub confirm_subscription: bool,
}

impl Default for FakeDaemonOptions {
    fn default() -> Self {
        Self {
            register_reply: String::from("Registered scheduled"),
            unregister_reply: String::from("Unregistered scheduled"),
            peers_body: String::from("{}"),
            confirm_data_mode: true,
            confirm_subscription: true,
        }
    }
}

#[derive(Default)]
struct Recorded {
    http_requests: Mutex<Vec<String>>,
    text_frames: Mutex<Vec<String>>,
    binary_frames: Mutex<Vec<Vec<u8>>>,
    stream_closed: AtomicBool,
}

/// In-process daemon bound to an ephemeral port.
pub(in crate::tests) struct FakeDaemon {
    port: u16,
    recorded: Arc<Recorded>,
    outbound: Sender<Message>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FakeDaemon {
    pub fn spawn(options: FakeDaemonOptions) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).context("bind fake daemon")?;
        listener
            .set_nonblocking(true)
            .context("fake daemon nonblocking")?;
        let port = listener.local_addr().context("local addr")?.port();
        let recorded = Arc::new(Recorded::default());
        let stop = Arc::new(AtomicBool::new(false));
        let (outbound, outbound_rx) = mpsc::channel();
        let handle = {
            let recorded = Arc::clone(&recorded);
            let stop = Arc::clone(&stop);
            let outbound_rx = Arc::new(Mutex::new(outbound_rx));
            thread::spawn(move || accept_loop(&listener, &options, &recorded, &outbound_rx, &stop))
        };
        Ok(Self {
            port,
            recorded,
            outbound,
            stop,
            handle: Some(handle),
        })
    }

    pub fn api(&self) -> DaemonApi {
        DaemonApi::new("127.0.0.1", self.port)
    }

    pub fn http_requests(&self) -> Vec<String> {
        self.recorded
            .http_requests
            .lock()
            .expect("lock http requests")
            .clone()
    }

    pub fn text_frames(&self) -> Vec<String> {
        self.recorded
            .text_frames
            .lock()
            .expect("lock text frames")
            .clone()
    }

    pub fn binary_frames(&self) -> Vec<Vec<u8>> {
        self.recorded
            .binary_frames
            .lock()
            .expect("lock binary frames")
            .clone()
    }

    pub fn stream_closed(&self) -> bool {
        self.recorded.stream_closed.load(Ordering::SeqCst)
    }

    /// Queues a frame for the connected stream client.
    pub fn push(&self, message: Message) -> Result<()> {
        self.outbound
            .send(message)
            .map_err(|_| anyhow!("fake daemon stream has stopped"))
    }
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _outcome = handle.join();
        }
    }
}

fn accept_loop(
    listener: &TcpListener,
    options: &FakeDaemonOptions,
    recorded: &Arc<Recorded>,
    outbound: &Arc<Mutex<Receiver<Message>>>,
    stop: &Arc<AtomicBool>,
) {
    let mut connections = Vec::new();
    while !stop.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                let options = options.clone();
                let recorded = Arc::clone(recorded);
                let outbound = Arc::clone(outbound);
                let stop = Arc::clone(stop);
                connections.push(thread::spawn(move || {
                    let _outcome = serve(stream, &options, &recorded, &outbound, &stop);
                }));
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => thread::sleep(POLL),
            Err(_) => break,
        }
    }
    for connection in connections {
        let _outcome = connection.join();
    }
}

fn serve(
    stream: TcpStream,
    options: &FakeDaemonOptions,
    recorded: &Recorded,
    outbound: &Mutex<Receiver<Message>>,
    stop: &AtomicBool,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    if is_stream_upgrade(&stream)? {
        serve_stream(stream, options, recorded, outbound, stop)
    } else {
        serve_http(stream, options, recorded)
    }
}

fn is_stream_upgrade(stream: &TcpStream) -> Result<bool> {
    let prefix = b"GET /ws ";
    let mut buffer = [0_u8; 8];
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let peeked = stream.peek(&mut buffer)?;
        if peeked >= prefix.len() || peeked == 0 || Instant::now() >= deadline {
            return Ok(buffer.as_slice() == prefix);
        }
        thread::sleep(POLL);
    }
}

fn serve_http(stream: TcpStream, options: &FakeDaemonOptions, recorded: &Recorded) -> Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header)? == 0 || header.trim().is_empty() {
            break;
        }
    }
    let target = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or_default()
        .to_owned();
    recorded
        .http_requests
        .lock()
        .map_err(|_| anyhow!("poisoned"))?
        .push(target.clone());

    let path = target.split('?').next().unwrap_or_default();
    let (status, body) = match path {
        "/register" => ("200 OK", options.register_reply.as_str()),
        "/unregister" => ("200 OK", options.unregister_reply.as_str()),
        "/status/peers" => ("200 OK", options.peers_body.as_str()),
        _ => ("404 Not Found", "not found"),
    };
    let mut stream = stream;
    write!(
        stream,
        "HTTP/1.1 {status}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )?;
    stream.flush()?;
    Ok(())
}

fn serve_stream(
    stream: TcpStream,
    options: &FakeDaemonOptions,
    recorded: &Recorded,
    outbound: &Mutex<Receiver<Message>>,
    stop: &AtomicBool,
) -> Result<()> {
    let mut socket = tungstenite::accept(stream).map_err(|error| anyhow!("handshake: {error}"))?;
    socket.get_ref().set_read_timeout(Some(POLL))?;
    let outcome = loop {
        if stop.load(Ordering::SeqCst) {
            break Ok(());
        }
        match socket.read() {
            Ok(Message::Text(text)) => {
                let reply = reply_to(&text, options);
                recorded
                    .text_frames
                    .lock()
                    .map_err(|_| anyhow!("poisoned"))?
                    .push(text);
                if let Some(reply) = reply {
                    socket.send(Message::Text(reply))?;
                }
            }
            Ok(Message::Binary(payload)) => recorded
                .binary_frames
                .lock()
                .map_err(|_| anyhow!("poisoned"))?
                .push(payload),
            Ok(Message::Close(_)) => break Ok(()),
            Ok(_) => {}
            Err(tungstenite::Error::Io(error))
                if matches!(
                    error.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                let pending: Vec<Message> = outbound
                    .lock()
                    .map_err(|_| anyhow!("poisoned"))?
                    .try_iter()
                    .collect();
                for message in pending {
                    socket.send(message)?;
                }
            }
            Err(error) => break Err(anyhow!("stream read: {error}")),
        }
    };
    recorded.stream_closed.store(true, Ordering::SeqCst);
    outcome
}

fn reply_to(text: &str, options: &FakeDaemonOptions) -> Option<String> {
    if text == "/data" && options.confirm_data_mode {
        return Some(String::from("200 tx mode: data"));
    }
    if text.starts_with("/subscribe ") && options.confirm_subscription {
        return Some(String::from("200 subscribed"));
    }
    if text.starts_with("/unsubscribe ") {
        return Some(String::from("200 unsubscribed"));
    }
    None
}
