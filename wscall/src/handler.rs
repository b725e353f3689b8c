use std::sync::Arc;

use tracing::warn;

use crate::handoff::Handoff;

/// Consumer of inbound payloads.
///
/// The session calls [`attach`](InboundHandler::attach) once at registration
/// with the handoff that the blocked caller is waiting on, then calls
/// [`handle`](InboundHandler::handle) on the event thread for every payload,
/// with the session lock held. Implementations must not block.
pub trait InboundHandler: Send {
    fn attach(&mut self, handoff: Arc<Handoff<String>>);
    fn handle(&mut self, payload: &str);
}

/// Hands every inbound payload to the waiting caller.
///
/// Suitable for services that never push unsolicited messages.
#[derive(Debug, Default)]
pub struct ResponseHandler {
    handoff: Option<Arc<Handoff<String>>>,
}

impl ResponseHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InboundHandler for ResponseHandler {
    fn attach(&mut self, handoff: Arc<Handoff<String>>) {
        self.handoff = Some(handoff);
    }

    fn handle(&mut self, payload: &str) {
        match self.handoff {
            Some(ref handoff) => handoff.offer(payload.to_string()),
            None => warn!(len = payload.len(), "inbound payload without handoff"),
        }
    }
}
