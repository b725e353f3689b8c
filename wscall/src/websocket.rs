//! WebSocket transport on top of `tungstenite`.
//!
//! The socket is owned by the context and only touched on the watchdog
//! thread. Writers on other threads go through [`Link`], which buffers text
//! messages until the next `service` pass sends them.

use std::collections::VecDeque;
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, trace};
use tungstenite::client::IntoClientRequest;
use tungstenite::handshake::HandshakeError;
use tungstenite::http::HeaderValue;
use tungstenite::{Message, WebSocket};

use crate::config::Endpoint;
use crate::error::{Error, Result};
use crate::transport::{Socket, Transport, TransportContext, TransportEvents};

/// [`Transport`] speaking plain `ws://` through `tungstenite`.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    connect_timeout: Duration,
    poll_interval: Duration,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        WebSocketTransport {
            connect_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(20),
        }
    }

    /// Bound on the TCP connect and the opening handshake of one attempt.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Longest a single socket read blocks. Outgoing messages wait at most
    /// this long before they are flushed.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for WebSocketTransport {
    fn create_context(&mut self, _endpoint: &Endpoint) -> Result<Box<dyn TransportContext>> {
        Ok(Box::new(WebSocketContext {
            connect_timeout: self.connect_timeout,
            poll_interval: self.poll_interval,
            socket: None,
            link: None,
            established: false,
            cancelled: false,
        }))
    }
}

/// Cross-thread write side of a tungstenite connection.
#[derive(Debug, Default)]
struct Link {
    outbox: Mutex<VecDeque<String>>,
    writable_requested: AtomicBool,
    closed: AtomicBool,
}

impl Link {
    fn pop(&self) -> Option<String> {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn has_pending(&self) -> bool {
        !self
            .outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    fn take_writable_request(&self) -> bool {
        self.writable_requested.swap(false, Ordering::AcqRel)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl Socket for Link {
    fn write_text(&self, payload: &str) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::NotConnected);
        }
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(payload.to_string());
        Ok(())
    }

    fn request_writable(&self) {
        self.writable_requested.store(true, Ordering::Release);
    }
}

enum Flow {
    Open,
    Closed,
    Failed(String),
}

impl From<tungstenite::Error> for Flow {
    fn from(e: tungstenite::Error) -> Self {
        match e {
            tungstenite::Error::Io(ref e)
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
            {
                Flow::Open
            }
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Flow::Closed
            }
            e => Flow::Failed(e.to_string()),
        }
    }
}

struct WebSocketContext {
    connect_timeout: Duration,
    poll_interval: Duration,
    socket: Option<WebSocket<TcpStream>>,
    link: Option<Arc<Link>>,
    established: bool,
    cancelled: bool,
}

impl WebSocketContext {
    fn teardown(&mut self) {
        self.socket = None;
        if let Some(link) = self.link.take() {
            link.close();
        }
    }
}

impl TransportContext for WebSocketContext {
    fn connect(&mut self, endpoint: &Endpoint) -> Result<Arc<dyn Socket>> {
        let mut request = endpoint.url().into_client_request()?;
        if !endpoint.protocol().is_empty() {
            let protocol = HeaderValue::from_str(endpoint.protocol()).map_err(|_| {
                Error::InvalidEndpoint(format!("bad protocol name '{}'", endpoint.protocol()))
            })?;
            request
                .headers_mut()
                .insert("Sec-WebSocket-Protocol", protocol);
        }

        let stream = open_tcp(&endpoint.address(), self.connect_timeout)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(self.connect_timeout))?;
        stream.set_write_timeout(Some(self.connect_timeout))?;

        let (socket, response) =
            tungstenite::client::client(request, stream).map_err(|e| match e {
                HandshakeError::Failure(e) => Error::WebSocket(e),
                HandshakeError::Interrupted(_) => Error::Timeout,
            })?;
        debug!(endpoint = %endpoint, status = %response.status(), "handshake complete");

        let link = Arc::new(Link::default());
        self.socket = Some(socket);
        self.link = Some(link.clone());
        self.established = false;
        self.cancelled = false;
        Ok(link)
    }

    fn service(&mut self, timeout: Duration, events: &mut dyn TransportEvents) -> Result<()> {
        let link = self.link.clone().ok_or(Error::NotConnected)?;
        if !self.established {
            self.established = true;
            events.on_established(link.clone());
        }

        let deadline = Instant::now() + timeout;
        loop {
            if self.cancelled {
                return Ok(());
            }
            let Some(socket) = self.socket.as_mut() else {
                return Err(Error::NotConnected);
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            let read_timeout = remaining.min(self.poll_interval).max(Duration::from_millis(1));

            match pump(socket, &link, events, read_timeout) {
                Flow::Open => {}
                Flow::Closed => {
                    self.teardown();
                    events.on_closed();
                    return Ok(());
                }
                Flow::Failed(reason) => {
                    self.teardown();
                    events.on_connection_error(&reason);
                    return Ok(());
                }
            }

            if Instant::now() >= deadline {
                return Ok(());
            }
        }
    }

    fn cancel_service(&mut self) {
        self.cancelled = true;
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.close(None);
            let _ = socket.flush();
        }
        if let Some(link) = self.link.take() {
            link.close();
        }
    }
}

/// One pass over the connection: send what is buffered, report writability,
/// then read at most one message.
fn pump(
    socket: &mut WebSocket<TcpStream>,
    link: &Link,
    events: &mut dyn TransportEvents,
    read_timeout: Duration,
) -> Flow {
    while let Some(payload) = link.pop() {
        trace!(len = payload.len(), "sending");
        if let Err(e) = socket.send(Message::text(payload)) {
            return e.into();
        }
    }

    if link.take_writable_request() {
        events.on_writable();
        if link.has_pending() {
            return Flow::Open;
        }
    }

    if let Err(e) = socket.get_ref().set_read_timeout(Some(read_timeout)) {
        return Flow::Failed(e.to_string());
    }

    match socket.read() {
        Ok(Message::Text(text)) => events.on_receive(text.as_str()),
        Ok(Message::Binary(data)) => events.on_receive(&String::from_utf8_lossy(&data)),
        Ok(Message::Close(frame)) => {
            debug!(?frame, "close frame received");
            let _ = socket.flush();
            return Flow::Closed;
        }
        Ok(_) => {}
        Err(e) => return e.into(),
    }
    Flow::Open
}

fn open_tcp(address: &str, timeout: Duration) -> Result<TcpStream> {
    let mut last_error = None;
    for addr in address.to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }
    Err(match last_error {
        Some(e) => Error::Io(e),
        None => Error::InvalidEndpoint(format!("'{}' resolves to no address", address)),
    })
}
