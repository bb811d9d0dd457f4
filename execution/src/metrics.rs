//! Minimal ambient metrics surface: plain atomic counters, not a metrics pipeline.
//! Exists so spec scenario #2 (duplicate submit) is observable — `idempotency.hits`
//! increments once per submit that was satisfied from the existing-order lookup
//! rather than a fresh dispatch — without pulling in a time-series dependency this
//! layer doesn't otherwise need.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct EngineMetrics {
    pub idempotency_hits: AtomicU64,
    pub submits: AtomicU64,
    pub retries: AtomicU64,
    pub circuit_short_circuits: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submit(&self) {
        self.submits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_idempotency_hit(&self) {
        self.idempotency_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_circuit_short_circuit(&self) {
        self.circuit_short_circuits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn idempotency_hits(&self) -> u64 {
        self.idempotency_hits.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_increment_independently() {
        let metrics = EngineMetrics::new();
        assert_eq!(metrics.idempotency_hits(), 0);
        metrics.record_idempotency_hit();
        metrics.record_idempotency_hit();
        metrics.record_submit();
        assert_eq!(metrics.idempotency_hits(), 2);
        assert_eq!(metrics.submits.load(Ordering::Relaxed), 1);
    }
}
