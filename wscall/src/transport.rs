//! The boundary between the connection core and a concrete event-driven transport.
//!
//! A transport hands out contexts. A context opens one connection at a time and
//! reports everything that happens on it through [`TransportEvents`] while the
//! watchdog thread is inside [`TransportContext::service`]. The resulting
//! [`Socket`] handle is shared with the session so the caller thread can write.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Endpoint;
use crate::error::Result;

/// Factory for transport contexts.
///
/// The watchdog creates a fresh context for every reconnect cycle and drops the
/// previous one, so a context never has to recover from a failed connection.
pub trait Transport: Send + 'static {
    fn create_context(&mut self, endpoint: &Endpoint) -> Result<Box<dyn TransportContext>>;
}

/// One connection attempt and the event loop that drives it.
pub trait TransportContext: Send {
    /// Starts a client connection to `endpoint`.
    ///
    /// A returned handle means the attempt is underway; the connection counts
    /// as usable only once [`TransportEvents::on_established`] has been called.
    fn connect(&mut self, endpoint: &Endpoint) -> Result<Arc<dyn Socket>>;

    /// Processes pending events for up to `timeout`, invoking `events` on the
    /// calling thread.
    fn service(&mut self, timeout: Duration, events: &mut dyn TransportEvents) -> Result<()>;

    /// Makes an in-flight or upcoming [`service`](TransportContext::service)
    /// call return as soon as possible.
    fn cancel_service(&mut self);
}

/// Write side of an open connection.
pub trait Socket: Send + Sync {
    /// Sends `payload` as one text message.
    fn write_text(&self, payload: &str) -> Result<()>;

    /// Asks for one [`TransportEvents::on_writable`] call once the transport
    /// can take the next message.
    fn request_writable(&self);
}

/// Lifecycle and I/O notifications delivered by a [`TransportContext`].
pub trait TransportEvents {
    fn on_established(&mut self, handle: Arc<dyn Socket>);
    fn on_connection_error(&mut self, reason: &str);
    fn on_closed(&mut self);
    fn on_receive(&mut self, payload: &str);
    fn on_writable(&mut self);
}
