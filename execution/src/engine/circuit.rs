//! Per-`(BrokerKind, endpoint)` circuit breaker (spec §4.4, §7): opens after N
//! consecutive failures in a window, half-opens after a cool-off, and short-circuits
//! to `Unavailable` with no upstream call while open.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Breaker {
    state: State,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl Breaker {
    fn new() -> Self {
        Self {
            state: State::Closed,
            consecutive_failures: 0,
            opened_at: None,
        }
    }
}

/// Configuration mirrors spec §6: `engine.circuit.failuresToOpen` (default 5),
/// `engine.circuit.coolOff` (default 30 s).
#[derive(Debug, Clone, Copy)]
pub struct CircuitConfig {
    pub failures_to_open: u32,
    pub cool_off: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failures_to_open: 5,
            cool_off: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    config: CircuitConfig,
    breakers: Mutex<HashMap<String, Breaker>>,
}

/// Whether the caller should proceed with the upstream call or fail fast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Proceed,
    ShortCircuit,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Checks whether a call to `key` (typically `"{broker_kind}:{endpoint}"`) may
    /// proceed, transitioning Open -> HalfOpen once the cool-off has elapsed.
    pub fn admit(&self, key: &str) -> Admission {
        let mut breakers = self.breakers.lock();
        let breaker = breakers.entry(key.to_string()).or_insert_with(Breaker::new);

        match breaker.state {
            State::Closed => Admission::Proceed,
            State::HalfOpen => Admission::Proceed,
            State::Open => {
                let elapsed = breaker.opened_at.map(|at| at.elapsed()).unwrap_or_default();
                if elapsed >= self.config.cool_off {
                    breaker.state = State::HalfOpen;
                    Admission::Proceed
                } else {
                    Admission::ShortCircuit
                }
            }
        }
    }

    /// Records a successful call: in `HalfOpen` this closes the breaker; in `Closed`
    /// it resets the failure streak.
    pub fn record_success(&self, key: &str) {
        let mut breakers = self.breakers.lock();
        let breaker = breakers.entry(key.to_string()).or_insert_with(Breaker::new);
        breaker.state = State::Closed;
        breaker.consecutive_failures = 0;
        breaker.opened_at = None;
    }

    /// Records a failed call. A failure while `HalfOpen` reopens immediately; a
    /// streak reaching `failures_to_open` while `Closed` opens the breaker.
    pub fn record_failure(&self, key: &str) {
        let mut breakers = self.breakers.lock();
        let breaker = breakers.entry(key.to_string()).or_insert_with(Breaker::new);
        match breaker.state {
            State::HalfOpen => {
                breaker.state = State::Open;
                breaker.opened_at = Some(Instant::now());
            }
            State::Closed | State::Open => {
                breaker.consecutive_failures += 1;
                if breaker.consecutive_failures >= self.config.failures_to_open {
                    breaker.state = State::Open;
                    breaker.opened_at = Some(Instant::now());
                }
            }
        }
    }
}
