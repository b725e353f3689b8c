//! Background thread that keeps the session connected.
//!
//! The watchdog thread has two jobs. While the session is disconnected it
//! creates a fresh transport context and tries to connect. Otherwise it is the
//! transport's event thread: it calls `service` in a loop, which is where all
//! dispatcher callbacks run.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::config::ReconnectPolicy;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::session::{ConnectionState, Session};
use crate::transport::{Transport, TransportContext};

/// Cooperative stop flag that can also interrupt a reconnect delay.
#[derive(Debug, Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    cv: Condvar,
}

impl StopSignal {
    fn stop(&self) {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.cv.notify_all();
    }

    fn is_stopped(&self) -> bool {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleeps for `delay` unless stopped first. Returns `true` if stopped.
    fn wait(&self, delay: Duration) -> bool {
        let stopped = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        let (stopped, _) = self
            .cv
            .wait_timeout_while(stopped, delay, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        *stopped
    }
}

/// Handle to the running watchdog thread.
///
/// Dropping it stops the thread and waits for it to exit.
#[derive(Debug)]
pub struct Watchdog {
    signal: Arc<StopSignal>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Watchdog {
    /// Starts the watchdog for `session`.
    pub fn spawn<T: Transport>(
        session: Arc<Session>,
        transport: T,
        service_timeout: Duration,
        policy: ReconnectPolicy,
    ) -> Result<Watchdog> {
        let signal = Arc::new(StopSignal::default());
        let mut worker = Worker {
            session,
            transport,
            signal: signal.clone(),
            context: None,
            service_timeout,
            delay: policy.initial_delay,
            policy,
        };
        let thread = thread::Builder::new()
            .name("wscall-watchdog".into())
            .spawn(move || worker.run())?;

        Ok(Watchdog {
            signal,
            thread: Some(thread),
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Asks the thread to exit after its current iteration and joins it.
    pub fn stop(&mut self) {
        self.signal.stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("watchdog thread panicked");
            }
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker<T> {
    session: Arc<Session>,
    transport: T,
    signal: Arc<StopSignal>,
    context: Option<Box<dyn TransportContext>>,
    service_timeout: Duration,
    policy: ReconnectPolicy,
    delay: Duration,
}

impl<T: Transport> Worker<T> {
    fn run(&mut self) {
        debug!(endpoint = %self.session.endpoint(), "watchdog started");

        while !self.signal.is_stopped() {
            if self.session.connect_state() != ConnectionState::Disconnected {
                self.service();
            } else {
                if self.signal.wait(self.delay) {
                    break;
                }
                self.reconnect();
            }
        }

        if let Some(mut context) = self.context.take() {
            context.cancel_service();
        }
        self.session.lock().set_disconnected();
        self.session.notify();
        debug!(endpoint = %self.session.endpoint(), "watchdog stopped");
    }

    fn service(&mut self) {
        let Some(context) = self.context.as_mut() else {
            self.session.lock().set_disconnected();
            return;
        };

        let mut dispatcher = Dispatcher::new(&self.session);
        if let Err(e) = context.service(self.service_timeout, &mut dispatcher) {
            warn!(error = %e, "event service failed");
            self.session.lock().set_disconnected();
            self.session.notify();
            return;
        }

        if self.session.connect_state() == ConnectionState::Connected {
            self.delay = self.policy.initial_delay;
        }
    }

    fn reconnect(&mut self) {
        // The old context belongs to a dead connection.
        self.context = None;

        let endpoint = self.session.endpoint();
        trace!(endpoint = %endpoint, delay = ?self.delay, "connecting");

        let attempt = self
            .transport
            .create_context(endpoint)
            .and_then(|mut context| context.connect(endpoint).map(|handle| (context, handle)));

        match attempt {
            Ok((context, handle)) => {
                self.session.lock().set_connecting(handle);
                self.context = Some(context);
                self.session.notify();
            }
            Err(e) => {
                debug!(endpoint = %endpoint, error = %e, "connect attempt failed");
                self.delay = self.policy.next_delay(self.delay);
            }
        }
    }
}
