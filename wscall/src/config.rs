use std::fmt;
use std::time::Duration;

/// Where the remote service lives.
///
/// All four parts are fixed for the life of a session; every reconnect goes
/// to the same endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
    protocol: String,
    path: String,
}

impl Endpoint {
    /// `path` is normalized to start with `/`. An empty `protocol` means no
    /// subprotocol is requested during the handshake.
    pub fn new<H, P, Q>(host: H, port: u16, protocol: P, path: Q) -> Self
    where
        H: Into<String>,
        P: Into<String>,
        Q: Into<String>,
    {
        let mut path = path.into();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        Endpoint {
            host: host.into(),
            port,
            protocol: protocol.into(),
            path,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// `host:port`, as used for the TCP connect and the `Host` header.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn url(&self) -> String {
        format!("ws://{}:{}{}", self.host, self.port, self.path)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

/// How long the watchdog waits between connect attempts.
///
/// The default retries every 50ms forever, without growing the delay. Set
/// `backoff_factor` above `1.0` for capped exponential backoff.
///
/// ```rust
/// # use std::time::Duration;
/// let p = wscall::ReconnectPolicy::default();
/// assert_eq!(p.initial_delay, Duration::from_millis(50));
/// assert_eq!(p.next_delay(p.initial_delay), p.initial_delay);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt, and after every successful connect
    pub initial_delay: Duration,
    /// Upper bound for the delay
    pub max_delay: Duration,
    /// Factor applied to the delay after each failed attempt
    pub backoff_factor: f64,
}

impl ReconnectPolicy {
    pub fn fixed(delay: Duration) -> Self {
        ReconnectPolicy {
            initial_delay: delay,
            max_delay: delay,
            backoff_factor: 1.0,
        }
    }

    pub fn exponential(initial_delay: Duration, max_delay: Duration) -> Self {
        ReconnectPolicy {
            initial_delay,
            max_delay,
            backoff_factor: 2.0,
        }
    }

    /// The delay to use after an attempt that waited `current`.
    ///
    /// A factor that is not a number above 1.0 keeps the delay fixed. A
    /// product too large for a `Duration` saturates at the cap.
    pub fn next_delay(&self, current: Duration) -> Duration {
        let cap = self.max_delay.max(self.initial_delay);
        if self.backoff_factor.is_nan() || self.backoff_factor <= 1.0 {
            return current.min(cap);
        }
        Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff_factor)
            .map_or(cap, |next| next.min(cap))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy::fixed(Duration::from_millis(50))
    }
}

/// `ClientConfig` specifies the configuration parameters for [`Client::connect`].
///
/// Every timeout defaults to `None`, which means "wait as long as it takes".
///
/// ```rust
/// let c = wscall::ClientConfig::default();
/// assert_eq!(c.service_timeout.as_millis(), 500);
/// assert!(c.connect_timeout.is_none());
/// assert!(c.call_timeout.is_none());
/// assert!(c.drain_timeout.is_none());
/// ```
///
/// [`Client::connect`]: crate::Client::connect
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long one watchdog pass may spend processing transport events
    pub service_timeout: Duration,
    /// Reconnect pacing while disconnected
    pub reconnect: ReconnectPolicy,
    /// Bound on the initial wait for the first connection
    pub connect_timeout: Option<Duration>,
    /// Bound on the wait for a response to a synchronous call
    pub call_timeout: Option<Duration>,
    /// Bound on the wait for queued messages to go out during teardown
    pub drain_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            service_timeout: Duration::from_millis(500),
            reconnect: ReconnectPolicy::default(),
            connect_timeout: None,
            call_timeout: None,
            drain_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_normalizes_path() {
        let e = Endpoint::new("localhost", 8080, "lws-mirror-protocol", "rpc");
        assert_eq!(e.path(), "/rpc");
        assert_eq!(e.address(), "localhost:8080");
        assert_eq!(e.url(), "ws://localhost:8080/rpc");

        let e = Endpoint::new("10.0.0.1", 9000, "", "/");
        assert_eq!(e.to_string(), "ws://10.0.0.1:9000/");
    }

    #[test]
    fn test_fixed_policy_never_grows() {
        let p = ReconnectPolicy::fixed(Duration::from_millis(100));
        let mut d = p.initial_delay;
        for _ in 0..5 {
            d = p.next_delay(d);
        }
        assert_eq!(d, Duration::from_millis(100));
    }

    #[test]
    fn test_degenerate_backoff_factor() {
        let d = Duration::from_millis(50);
        for factor in [f64::NAN, -2.0, 0.0] {
            let p = ReconnectPolicy {
                backoff_factor: factor,
                ..ReconnectPolicy::exponential(d, Duration::from_secs(1))
            };
            assert_eq!(p.next_delay(d), d);
        }

        let p = ReconnectPolicy {
            backoff_factor: f64::INFINITY,
            ..ReconnectPolicy::exponential(d, Duration::from_secs(1))
        };
        assert_eq!(p.next_delay(d), Duration::from_secs(1));

        let p = ReconnectPolicy::exponential(d, Duration::MAX);
        assert_eq!(p.next_delay(Duration::MAX), Duration::MAX);
    }

    #[test]
    fn test_exponential_policy_is_capped() {
        let p = ReconnectPolicy::exponential(Duration::from_millis(50), Duration::from_millis(300));
        let mut delays = vec![p.initial_delay];
        for _ in 0..4 {
            let next = p.next_delay(*delays.last().unwrap());
            delays.push(next);
        }
        assert_eq!(
            delays,
            [50, 100, 200, 300, 300].map(Duration::from_millis).to_vec()
        );
    }
}
