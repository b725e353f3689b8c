//! Single-slot blocking handoff between the event thread and a waiting caller.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A one-element rendezvous channel.
///
/// The event thread [`offer`]s a value, and the caller blocked in [`take`]
/// receives it. The slot holds at most one value: offering twice before a
/// `take` overwrites the first value, which is then lost. The call protocol
/// keeps exactly one request in flight, so this never happens for a
/// well-behaved peer.
///
/// ```
/// use wscall::Handoff;
///
/// let handoff = Handoff::new();
/// handoff.offer("x".to_string());
/// assert_eq!(handoff.take(), "x");
/// ```
///
/// [`offer`]: Handoff::offer
/// [`take`]: Handoff::take
#[derive(Debug)]
pub struct Handoff<T> {
    slot: Mutex<Option<T>>,
    delivered: Condvar,
}

impl<T> Handoff<T> {
    pub fn new() -> Self {
        Handoff {
            slot: Mutex::new(None),
            delivered: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `value` and wakes one waiter.
    pub fn offer(&self, value: T) {
        let mut slot = self.lock();
        *slot = Some(value);
        drop(slot);
        self.delivered.notify_one();
    }

    /// Blocks until a value has been offered, then removes and returns it.
    ///
    /// There is no timeout. Use [`take_timeout`](Handoff::take_timeout) for a
    /// bounded wait.
    pub fn take(&self) -> T {
        let mut slot = self.lock();
        loop {
            if let Some(value) = slot.take() {
                return value;
            }
            slot = self
                .delivered
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`take`](Handoff::take), but gives up after `timeout`.
    pub fn take_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.lock();
        loop {
            if let Some(value) = slot.take() {
                return Some(value);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            slot = self
                .delivered
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Discards any value that nobody has taken yet.
    pub fn clear(&self) -> Option<T> {
        self.lock().take()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }
}

impl<T> Default for Handoff<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_offer_then_take() {
        let handoff = Handoff::new();
        handoff.offer("x".to_string());
        assert_eq!(handoff.take(), "x");
        assert!(handoff.is_empty());
    }

    #[test]
    fn test_second_offer_overwrites() {
        let handoff = Handoff::new();
        handoff.offer("x");
        handoff.offer("y");
        assert_eq!(handoff.take(), "y");
        assert_eq!(handoff.take_timeout(Duration::from_millis(20)), None);
    }

    #[test]
    fn test_take_blocks_until_offer() {
        let handoff = Arc::new(Handoff::new());
        let producer = {
            let handoff = handoff.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                handoff.offer(42);
            })
        };
        assert_eq!(handoff.take(), 42);
        producer.join().unwrap();
    }

    #[test]
    fn test_take_timeout_expires() {
        let handoff: Handoff<u32> = Handoff::new();
        let start = Instant::now();
        assert_eq!(handoff.take_timeout(Duration::from_millis(30)), None);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_clear_drops_stale_value() {
        let handoff = Handoff::new();
        handoff.offer("stale");
        assert_eq!(handoff.clear(), Some("stale"));
        handoff.offer("fresh");
        assert_eq!(handoff.take(), "fresh");
    }
}
