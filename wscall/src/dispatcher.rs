use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::session::Session;
use crate::transport::{Socket, TransportEvents};

/// Turns transport events into session state transitions.
///
/// Runs on the watchdog thread, inside `TransportContext::service`. Every
/// branch takes the session lock for its whole duration and never waits on
/// anything else, so the caller thread is held up for at most one event.
pub(crate) struct Dispatcher<'a> {
    session: &'a Session,
}

impl<'a> Dispatcher<'a> {
    pub(crate) fn new(session: &'a Session) -> Self {
        Dispatcher { session }
    }
}

impl TransportEvents for Dispatcher<'_> {
    fn on_established(&mut self, handle: Arc<dyn Socket>) {
        {
            let mut inner = self.session.lock();
            inner.set_connected(handle.clone());
        }
        info!(endpoint = %self.session.endpoint(), "connection established");
        handle.request_writable();
        self.session.notify();
    }

    fn on_connection_error(&mut self, reason: &str) {
        self.session.lock().set_disconnected();
        warn!(endpoint = %self.session.endpoint(), reason, "connection error");
        self.session.notify();
    }

    fn on_closed(&mut self) {
        self.session.lock().set_disconnected();
        info!(endpoint = %self.session.endpoint(), "connection closed");
        self.session.notify();
    }

    fn on_receive(&mut self, payload: &str) {
        let mut inner = self.session.lock();
        trace!(len = payload.len(), "received");
        match inner.handler.as_mut() {
            Some(handler) => handler.handle(payload),
            None => warn!(len = payload.len(), "no inbound handler, dropping payload"),
        }
    }

    fn on_writable(&mut self) {
        let mut inner = self.session.lock();
        match inner.remove_oldest_enqueued_message() {
            Some(payload) => {
                if let Err(e) = inner.write_message(&payload) {
                    // Keep the payload at the head so it goes out after the reconnect.
                    warn!(error = %e, "write failed, message stays queued");
                    inner.queue.push_front(payload);
                    return;
                }
                debug!(queued = inner.queue.len(), "dequeued message written");
                if !inner.has_enqueued_messages() {
                    drop(inner);
                    self.session.notify();
                }
            }
            None => inner.writable = true,
        }
    }
}
