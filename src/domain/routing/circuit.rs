//! Per-provider circuit breaker
//!
//! Time is always passed in explicitly so the state machine can be driven
//! deterministically; the router supplies `Instant::now()`.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rand::Rng;
use serde::Serialize;

/// Configuration shared by every breaker owned by one router
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip a closed circuit
    pub failure_threshold: u32,
    /// Open window after the first trip
    pub base_backoff: Duration,
    /// Upper bound for the open window (before jitter)
    pub max_backoff: Duration,
    /// Extra random share of the backoff added to each open window (0.0 - 1.0)
    pub jitter_ratio: f64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            jitter_ratio: 0.1,
        }
    }
}

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Read-only view of a breaker for health reporting
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub backoff_ms: u64,
    /// Remaining open window, if the circuit is open
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_for_ms: Option<u64>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    open_until: Option<Instant>,
    backoff: Duration,
    probe_in_flight: bool,
}

/// Circuit breaker for a single provider
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                open_until: None,
                backoff: Duration::ZERO,
                probe_in_flight: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask permission to call the provider.
    ///
    /// Returns `None` when the circuit is open and the window has not
    /// elapsed, or when a half-open probe is already in flight. An open
    /// circuit whose window elapsed moves to half-open and admits exactly
    /// one probe.
    pub fn try_acquire(&self, now: Instant) -> Option<CircuitPermit<'_>> {
        let mut inner = self.lock();

        let probe = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let elapsed = inner.open_until.is_none_or(|until| now >= until);
                if !elapsed {
                    return None;
                }
                inner.state = CircuitState::HalfOpen;
                inner.probe_in_flight = true;
                true
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    return None;
                }
                inner.probe_in_flight = true;
                true
            }
        };

        Some(CircuitPermit {
            breaker: self,
            probe,
            settled: false,
        })
    }

    /// Successful call: close the circuit and forget past failures
    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.open_until = None;
        inner.backoff = Duration::ZERO;
        inner.probe_in_flight = false;
    }

    /// Failed call: returns the resulting state
    pub fn record_failure(&self, now: Instant) -> CircuitState {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        match inner.state {
            CircuitState::Closed => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    let exponent = inner.consecutive_failures - self.config.failure_threshold;
                    let backoff = scale_backoff(self.config.base_backoff, exponent);
                    self.open(&mut inner, backoff.min(self.config.max_backoff), now);
                }
            }
            CircuitState::HalfOpen => {
                let doubled = inner.backoff.max(self.config.base_backoff).saturating_mul(2);
                self.open(&mut inner, doubled.min(self.config.max_backoff), now);
            }
            // A call admitted before the trip finished late; keep the current window.
            CircuitState::Open => {}
        }

        inner.state
    }

    /// Give back a probe that ended without an outcome (cancelled call)
    fn release_probe(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.probe_in_flight = false;
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn snapshot(&self, now: Instant) -> CircuitSnapshot {
        let inner = self.lock();
        let open_for_ms = match (inner.state, inner.open_until) {
            (CircuitState::Open, Some(until)) => {
                Some(until.saturating_duration_since(now).as_millis() as u64)
            }
            _ => None,
        };

        CircuitSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            backoff_ms: inner.backoff.as_millis() as u64,
            open_for_ms,
        }
    }

    fn open(&self, inner: &mut BreakerInner, backoff: Duration, now: Instant) {
        inner.state = CircuitState::Open;
        inner.backoff = backoff;
        inner.open_until = Some(now + backoff + self.jitter(backoff));
        inner.probe_in_flight = false;
    }

    fn jitter(&self, backoff: Duration) -> Duration {
        if self.config.jitter_ratio <= 0.0 {
            return Duration::ZERO;
        }

        let ratio = rand::thread_rng().gen_range(0.0..=self.config.jitter_ratio.min(1.0));
        backoff.mul_f64(ratio)
    }
}

fn scale_backoff(base: Duration, exponent: u32) -> Duration {
    let factor = 1u32.checked_shl(exponent.min(31)).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

/// Admission to call a provider; report the outcome through it.
///
/// Dropping an unsettled probe permit (e.g. the call was cancelled) hands
/// the probe slot back so the circuit does not stay half-open forever.
#[derive(Debug)]
pub struct CircuitPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl CircuitPermit<'_> {
    /// Whether this call is the single half-open probe
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn succeed(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    pub fn fail(mut self, now: Instant) -> CircuitState {
        self.settled = true;
        self.breaker.record_failure(now)
    }
}

impl Drop for CircuitPermit<'_> {
    fn drop(&mut self) {
        if self.probe && !self.settled {
            self.breaker.release_probe();
        }
    }
}
