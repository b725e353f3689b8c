//! Synchronous call facade over a watched session.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::config::{ClientConfig, Endpoint};
use crate::error::{Error, Result};
use crate::handler::InboundHandler;
use crate::session::{ConnectionState, Session};
use crate::transport::Transport;
use crate::watchdog::Watchdog;

/// A connected client.
///
/// [`Client::connect`] returns once the first connection is up. From then on
/// the watchdog keeps reconnecting in the background; [`call`](Client::call)
/// fails fast with [`Error::NotConnected`] while it is down.
///
/// ```rust,no_run
/// use wscall::{Client, ClientConfig, Endpoint, ResponseHandler, WebSocketTransport};
///
/// let client = Client::connect(
///     Endpoint::new("localhost", 8080, "rpc", "/"),
///     WebSocketTransport::new(),
///     ResponseHandler::new(),
///     ClientConfig::default(),
/// )?;
/// let pong = client.call("ping")?;
/// # Ok::<(), wscall::Error>(())
/// ```
#[derive(Debug)]
pub struct Client {
    session: Arc<Session>,
    watchdog: Option<Watchdog>,
    config: ClientConfig,
    call_lock: Mutex<()>,
}

impl Client {
    /// Creates the session, starts its watchdog and blocks until the first
    /// connection is established.
    ///
    /// Waits indefinitely unless `config.connect_timeout` is set, in which
    /// case the watchdog is shut down again and [`Error::Timeout`] returned.
    pub fn connect<T, H>(
        endpoint: Endpoint,
        transport: T,
        handler: H,
        config: ClientConfig,
    ) -> Result<Client>
    where
        T: Transport,
        H: InboundHandler + 'static,
    {
        let session = Arc::new(Session::new(endpoint));
        session.set_handler(Box::new(handler));

        let mut watchdog = Watchdog::spawn(
            session.clone(),
            transport,
            config.service_timeout,
            config.reconnect.clone(),
        )?;

        debug!(endpoint = %session.endpoint(), "waiting for connection");
        if let Err(e) = session.wait_for_state(ConnectionState::Connected, config.connect_timeout) {
            watchdog.stop();
            return Err(e);
        }
        info!(endpoint = %session.endpoint(), "connected");

        Ok(Client {
            session,
            watchdog: Some(watchdog),
            config,
            call_lock: Mutex::new(()),
        })
    }

    /// Sends `payload` and blocks until the response arrives.
    ///
    /// Only one call is in flight at a time; concurrent callers queue up on an
    /// internal lock. The response is whatever the inbound handler offers to
    /// the handoff next.
    pub fn call<S: Into<String>>(&self, payload: S) -> Result<String> {
        let _call = self.call_lock.lock().unwrap_or_else(PoisonError::into_inner);

        // The state is checked only after the lock: the connection may have
        // dropped while the previous call was in flight.
        if self.connect_state() != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }
        let handoff = self.session.handoff();
        if handoff.clear().is_some() {
            debug!("discarded stale response");
        }

        self.session.send_connected(payload.into())?;

        match self.config.call_timeout {
            None => Ok(handoff.take()),
            Some(timeout) => handoff.take_timeout(timeout).ok_or(Error::Timeout),
        }
    }

    /// Sends `payload` without waiting for anything to come back.
    pub fn send_async<S: Into<String>>(&self, payload: S) -> Result<()> {
        self.session.send_connected(payload.into())
    }

    pub fn connect_state(&self) -> ConnectionState {
        self.session.connect_state()
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Waits for queued messages to go out, then stops the watchdog.
    ///
    /// Dropping the client does the same, but cannot report a drain timeout.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(mut watchdog) = self.watchdog.take() else {
            return Ok(());
        };

        let drained = self.session.wait_until_drained(self.config.drain_timeout);
        if drained.is_err() {
            warn!(
                queued = self.session.queued(),
                "giving up on undelivered messages"
            );
        }

        watchdog.stop();
        debug!(endpoint = %self.session.endpoint(), "client closed");
        drained
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
