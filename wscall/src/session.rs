//! Connection state shared between the caller and the watchdog thread.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::Endpoint;
use crate::error::{Error, Result};
use crate::handler::InboundHandler;
use crate::handoff::Handoff;
use crate::transport::Socket;

/// Lifecycle of the one logical connection of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection; the watchdog will try to open one
    #[default]
    Disconnected,
    /// A connect attempt is underway
    Connecting,
    /// The handshake completed; calls may be issued
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        })
    }
}

/// Everything guarded by the session lock.
///
/// Holding a `&mut SessionState` is proof that the lock is held, which is what
/// [`write_message`](SessionState::write_message) relies on.
pub(crate) struct SessionState {
    pub(crate) state: ConnectionState,
    pub(crate) writable: bool,
    pub(crate) queue: VecDeque<String>,
    pub(crate) handle: Option<Arc<dyn Socket>>,
    pub(crate) handler: Option<Box<dyn InboundHandler>>,
}

impl SessionState {
    fn new() -> Self {
        SessionState {
            state: ConnectionState::Disconnected,
            writable: false,
            queue: VecDeque::new(),
            handle: None,
            handler: None,
        }
    }

    pub(crate) fn enqueue_message(&mut self, payload: String) {
        self.queue.push_back(payload);
    }

    pub(crate) fn remove_oldest_enqueued_message(&mut self) -> Option<String> {
        self.queue.pop_front()
    }

    pub(crate) fn has_enqueued_messages(&self) -> bool {
        !self.queue.is_empty()
    }

    fn send(&mut self, payload: String) -> Result<()> {
        if self.writable {
            self.write_message(&payload)
        } else {
            self.enqueue_message(payload);
            Ok(())
        }
    }

    /// Writes `payload` to the active handle and asks to be told when the
    /// next write may go out.
    pub(crate) fn write_message(&mut self, payload: &str) -> Result<()> {
        let handle = self.handle.as_ref().ok_or(Error::NotConnected)?;
        self.writable = false;
        handle.write_text(payload)?;
        handle.request_writable();
        Ok(())
    }

    pub(crate) fn set_connecting(&mut self, handle: Arc<dyn Socket>) {
        self.state = ConnectionState::Connecting;
        self.handle = Some(handle);
        self.writable = false;
    }

    pub(crate) fn set_connected(&mut self, handle: Arc<dyn Socket>) {
        self.state = ConnectionState::Connected;
        self.handle = Some(handle);
    }

    pub(crate) fn set_disconnected(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.handle = None;
        self.writable = false;
    }
}

/// One logical connection to an [`Endpoint`].
///
/// The session owns the connection state, the outbound queue and the
/// [`Handoff`] that synchronous calls wait on. A single lock guards the
/// mutable part; the handoff has its own lock, so a caller blocked on a
/// response never holds the session lock.
pub struct Session {
    endpoint: Endpoint,
    inner: Mutex<SessionState>,
    changed: Condvar,
    handoff: Arc<Handoff<String>>,
}

impl Session {
    pub fn new(endpoint: Endpoint) -> Self {
        Session {
            endpoint,
            inner: Mutex::new(SessionState::new()),
            changed: Condvar::new(),
            handoff: Arc::new(Handoff::new()),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn handoff(&self) -> &Arc<Handoff<String>> {
        &self.handoff
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wakes everybody waiting in [`wait_for_state`](Session::wait_for_state)
    /// or [`wait_until_drained`](Session::wait_until_drained).
    pub(crate) fn notify(&self) {
        self.changed.notify_all();
    }

    /// Registers the consumer of inbound payloads and wires it to the handoff.
    pub fn set_handler(&self, mut handler: Box<dyn InboundHandler>) {
        handler.attach(self.handoff.clone());
        self.lock().handler = Some(handler);
    }

    /// Sends `payload` now if the transport is writable, otherwise queues it
    /// behind everything sent earlier.
    pub fn send_async(&self, payload: String) -> Result<()> {
        self.lock().send(payload)
    }

    /// Like [`send_async`](Session::send_async), but fails with
    /// [`Error::NotConnected`] unless the session is connected. The state
    /// check and the send happen under one lock.
    pub fn send_connected(&self, payload: String) -> Result<()> {
        let mut inner = self.lock();
        if inner.state != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }
        inner.send(payload)
    }

    pub fn connect_state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn is_writable(&self) -> bool {
        self.lock().writable
    }

    pub fn has_enqueued_messages(&self) -> bool {
        self.lock().has_enqueued_messages()
    }

    /// Number of messages waiting for the transport to become writable.
    pub fn queued(&self) -> usize {
        self.lock().queue.len()
    }

    /// Blocks until the connection reaches `target`.
    ///
    /// With `timeout == None` this waits indefinitely.
    pub fn wait_for_state(&self, target: ConnectionState, timeout: Option<Duration>) -> Result<()> {
        self.wait_while(timeout, |inner| inner.state != target)
    }

    /// Blocks until the outbound queue is empty.
    pub fn wait_until_drained(&self, timeout: Option<Duration>) -> Result<()> {
        self.wait_while(timeout, |inner| inner.has_enqueued_messages())
    }

    fn wait_while<F>(&self, timeout: Option<Duration>, mut condition: F) -> Result<()>
    where
        F: FnMut(&mut SessionState) -> bool,
    {
        let guard = self.lock();
        match timeout {
            None => {
                let _guard = self
                    .changed
                    .wait_while(guard, condition)
                    .unwrap_or_else(PoisonError::into_inner);
                Ok(())
            }
            Some(timeout) => {
                let (mut guard, _) = self
                    .changed
                    .wait_timeout_while(guard, timeout, &mut condition)
                    .unwrap_or_else(PoisonError::into_inner);
                if condition(&mut guard) {
                    Err(Error::Timeout)
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("Session")
            .field("endpoint", &self.endpoint)
            .field("state", &inner.state)
            .field("writable", &inner.writable)
            .field("queued", &inner.queue.len())
            .finish()
    }
}
