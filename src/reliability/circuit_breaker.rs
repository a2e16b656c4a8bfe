//! Circuit breaker for the remote-browser provider
//!
//! Detects a consistently failing provider and short-circuits further
//! session creations, saving time and remote-browser quota.
//!
//! One breaker guards all session creations in the process, across three
//! states:
//! - Closed: normal operation, requests proceed
//! - Open: too many failures, requests are rejected until the reset delay
//! - `HalfOpen`: probing after the reset delay

use log::{debug, info, warn};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - requests proceed
    Closed,
    /// Probing after the reset delay - requests allowed
    HalfOpen,
    /// Failing - requests rejected until `opens_until`
    Open,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: u32,
    opens_until: Option<Instant>,
}

/// Process-wide failure gate for session creation.
///
/// Thread-safe; clone an `Arc<CircuitBreaker>` into every component that
/// creates sessions.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    fail_threshold: u32,
    reset_after: Duration,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}

impl CircuitBreaker {
    /// Create a breaker that opens after `fail_threshold` recorded failures
    /// and starts probing again `reset_after` later.
    #[must_use]
    pub fn new(fail_threshold: u32, reset_after: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: 0,
                opens_until: None,
            }),
            fail_threshold,
            reset_after,
        }
    }

    /// Check whether a request may proceed.
    ///
    /// Returns `false` only while Open and inside the reset window. An Open
    /// breaker whose window has elapsed transitions to `HalfOpen` and
    /// permits the probe.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .opens_until
                    .is_none_or(|until| Instant::now() >= until);
                if elapsed {
                    inner.state = CircuitState::HalfOpen;
                    inner.opens_until = None;
                    info!("Circuit breaker transitioning to HALF-OPEN after reset delay");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record the outcome of a permitted request.
    ///
    /// A success in `HalfOpen` closes the circuit; successes also decay the
    /// failure count. A failure increments the count and opens the circuit
    /// once `fail_threshold` is reached, resetting the count.
    pub fn record(&self, success: bool) {
        let mut inner = self.inner.lock();
        if success {
            if inner.state == CircuitState::HalfOpen {
                inner.state = CircuitState::Closed;
                info!("Circuit breaker CLOSED after successful probe");
            }
            inner.failures = inner.failures.saturating_sub(1);
            return;
        }

        inner.failures += 1;
        debug!(
            "Circuit breaker failure recorded ({}/{})",
            inner.failures, self.fail_threshold
        );
        if inner.failures >= self.fail_threshold {
            inner.state = CircuitState::Open;
            inner.opens_until = Some(Instant::now() + self.reset_after);
            inner.failures = 0;
            warn!(
                "Circuit breaker OPEN after {} consecutive failures; rejecting session creations for {:?}",
                self.fail_threshold, self.reset_after
            );
        }
    }

    /// Current state, for logging and tests.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_breaker_permits_requests() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(60));
        assert!(cb.allow());
        cb.record(true);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn opens_after_threshold_failures() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(60));
        cb.record(false);
        cb.record(false);
        assert!(cb.allow());
        cb.record(false);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow());
    }

    #[test]
    fn never_permits_threshold_failures_without_opening() {
        // Invariant: `fail_threshold` consecutive failures always open the circuit.
        let cb = CircuitBreaker::new(5, Duration::from_secs(60));
        for _ in 0..5 {
            assert_ne!(cb.state(), CircuitState::Open);
            cb.record(false);
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn success_decays_failure_count() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(60));
        cb.record(false);
        cb.record(false);
        cb.record(true); // failures back to 1
        cb.record(false); // 2 - still under threshold
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record(false);
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn half_open_after_reset_then_closes_on_success() {
        let cb = CircuitBreaker::new(2, Duration::from_millis(50));
        cb.record(false);
        cb.record(false);
        assert!(!cb.allow());

        std::thread::sleep(Duration::from_millis(80));
        assert!(cb.allow());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record(true);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn failure_count_resets_when_opening() {
        let cb = CircuitBreaker::new(2, Duration::from_millis(10));
        cb.record(false);
        cb.record(false);
        std::thread::sleep(Duration::from_millis(30));
        assert!(cb.allow()); // HalfOpen
        // One failure in HalfOpen does not immediately reopen; count restarted at 0.
        cb.record(false);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record(false);
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
