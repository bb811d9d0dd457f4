//! Streaming sub-component of the Transport layer (spec §4.2, §4.6): reconnect
//! backoff, heartbeat tracking, and the bounded outbound queue every subscriber gets.
//! The Streaming Hub owns subscription bookkeeping; this module owns the primitives a
//! single upstream WebSocket connection needs regardless of which hub uses it.

use std::time::Duration;

/// Full-jitter exponential backoff, capped, for WebSocket reconnect attempts
/// (spec §4.6: reconnect uses capped exponential backoff with jitter).
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max, attempt: 0 }
    }

    /// Duration to wait before the next attempt, then advances internal attempt count.
    /// Jitter is deterministic-free (full jitter over `[0, min(max, base * 2^attempt))`)
    /// so callers own their own RNG; this returns the upper bound and the caller samples.
    pub fn next_delay_bound(&mut self) -> Duration {
        let exp = self.base.saturating_mul(1u32.checked_shl(self.attempt).unwrap_or(u32::MAX));
        let bound = exp.min(self.max);
        self.attempt = self.attempt.saturating_add(1);
        bound
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// Heartbeat liveness tracker: a stream is considered stalled if no heartbeat or data
/// frame has been observed within `timeout` (spec §4.6, typically 2x the expected
/// server heartbeat interval).
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    timeout: Duration,
    last_seen: std::time::Instant,
}

impl HeartbeatMonitor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_seen: std::time::Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = std::time::Instant::now();
    }

    pub fn is_stalled(&self) -> bool {
        self.last_seen.elapsed() >= self.timeout
    }
}

/// Identifies the entity an event belongs to (an order id, a position's symbol, a
/// quote's symbol) so overflow handling can tell "a newer update for the same thing"
/// apart from "an update for something else entirely" (spec §4.6).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey(pub String);

/// Backpressure policy applied per push, not per queue (spec §4.6, invariant I6/P5):
/// a subscriber's queue carries several event kinds, each needing its own overflow
/// behaviour.
///
/// - `CoalesceBySymbol`: quote ticks coalesce with an already-queued tick for the
///   *same* symbol (oldest dropped in favour of the newest); with no same-symbol entry
///   to coalesce into, the globally oldest item is dropped to make room instead of
///   disconnecting - one stale tick for another symbol is an acceptable loss.
/// - `DedupeByEntity`: order/position events dedupe against an already-queued event for
///   the *same* entity (same orderId/symbol, keep latest); distinct entities are never
///   coalesced against each other - if there's no same-entity duplicate to replace, the
///   subscriber is disconnected instead of dropping someone else's update.
/// - `DisconnectOnFull`: no coalescing at all (control events like `StreamResumed`);
///   a full queue always disconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    CoalesceBySymbol,
    DedupeByEntity,
    DisconnectOnFull,
}

#[derive(Debug)]
pub struct SubscriberQueue<T> {
    capacity: usize,
    items: std::collections::VecDeque<(Option<EntityKey>, T)>,
    disconnected: bool,
}

impl<T> SubscriberQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: std::collections::VecDeque::with_capacity(capacity),
            disconnected: false,
        }
    }

    /// Pushes `item` tagged with `key`, applying `policy` only if the queue is
    /// currently full. Returns `false` if this push caused (or found) the subscriber
    /// disconnected.
    pub fn push(&mut self, item: T, key: Option<EntityKey>, policy: OverflowPolicy) -> bool {
        if self.disconnected {
            return false;
        }
        if self.items.len() < self.capacity {
            self.items.push_back((key, item));
            return true;
        }

        match policy {
            OverflowPolicy::CoalesceBySymbol => {
                if let Some(pos) = key.as_ref().and_then(|key| self.items.iter().position(|(k, _)| k.as_ref() == Some(key)))
                {
                    self.items[pos] = (key, item);
                } else {
                    self.items.pop_front();
                    self.items.push_back((key, item));
                }
                true
            }
            OverflowPolicy::DedupeByEntity => {
                if let Some(pos) = key.as_ref().and_then(|key| self.items.iter().position(|(k, _)| k.as_ref() == Some(key)))
                {
                    self.items[pos] = (key, item);
                    true
                } else {
                    self.disconnected = true;
                    false
                }
            }
            OverflowPolicy::DisconnectOnFull => {
                self.disconnected = true;
                false
            }
        }
    }

    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_front().map(|(_, item)| item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_capped_at_max() {
        let mut backoff = ReconnectBackoff::new(Duration::from_secs(1), Duration::from_secs(30));
        assert_eq!(backoff.next_delay_bound(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay_bound(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay_bound(), Duration::from_secs(4));
        for _ in 0..10 {
            backoff.next_delay_bound();
        }
        assert_eq!(backoff.next_delay_bound(), Duration::from_secs(30));
    }

    #[test]
    fn backoff_resets_to_base_after_reset() {
        let mut backoff = ReconnectBackoff::new(Duration::from_secs(1), Duration::from_secs(30));
        backoff.next_delay_bound();
        backoff.next_delay_bound();
        backoff.reset();
        assert_eq!(backoff.next_delay_bound(), Duration::from_secs(1));
    }

    #[test]
    fn heartbeat_monitor_is_stalled_after_timeout_elapses() {
        let monitor = HeartbeatMonitor::new(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(1));
        assert!(monitor.is_stalled());
    }

    #[test]
    fn coalesce_by_symbol_replaces_the_queued_tick_for_the_same_symbol() {
        let mut queue = SubscriberQueue::new(2);
        let aapl = EntityKey("AAPL".into());
        assert!(queue.push(1, Some(aapl.clone()), OverflowPolicy::CoalesceBySymbol));
        assert!(queue.push(2, None, OverflowPolicy::CoalesceBySymbol));
        // queue is full; a new AAPL tick replaces the queued AAPL tick in place rather
        // than evicting the unrelated item.
        assert!(queue.push(3, Some(aapl), OverflowPolicy::CoalesceBySymbol));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), Some(2));
    }

    #[test]
    fn coalesce_by_symbol_drops_oldest_when_no_same_symbol_entry_exists() {
        let mut queue = SubscriberQueue::new(2);
        assert!(queue.push(1, Some(EntityKey("AAPL".into())), OverflowPolicy::CoalesceBySymbol));
        assert!(queue.push(2, Some(EntityKey("MSFT".into())), OverflowPolicy::CoalesceBySymbol));
        assert!(queue.push(3, Some(EntityKey("GOOG".into())), OverflowPolicy::CoalesceBySymbol));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
    }

    #[test]
    fn dedupe_by_entity_replaces_only_a_same_entity_update() {
        let mut queue = SubscriberQueue::new(2);
        let order_a = EntityKey("order-a".into());
        assert!(queue.push("a:new", Some(order_a.clone()), OverflowPolicy::DedupeByEntity));
        assert!(queue.push("b:new", Some(EntityKey("order-b".into())), OverflowPolicy::DedupeByEntity));
        assert!(queue.push("a:filled", Some(order_a), OverflowPolicy::DedupeByEntity));
        assert_eq!(queue.pop(), Some("a:filled"));
        assert_eq!(queue.pop(), Some("b:new"));
    }

    /// spec §4.6: distinct entities are never coalesced against each other - a full
    /// queue with no same-entity duplicate to dedupe disconnects the subscriber
    /// instead of silently dropping someone else's update (the `SLOW_CONSUMER` path).
    #[test]
    fn dedupe_by_entity_disconnects_rather_than_drop_an_unrelated_entity() {
        let mut queue = SubscriberQueue::new(1);
        assert!(queue.push("order-a:new", Some(EntityKey("order-a".into())), OverflowPolicy::DedupeByEntity));
        assert!(!queue.push("order-c:new", Some(EntityKey("order-c".into())), OverflowPolicy::DedupeByEntity));
        assert!(queue.is_disconnected());
        // the order-a update already queued survives the attempted order-c push.
        assert_eq!(queue.pop(), Some("order-a:new"));
    }

    #[test]
    fn disconnect_on_full_queue_disconnects_instead_of_dropping() {
        let mut queue = SubscriberQueue::new(1);
        assert!(queue.push(1, None, OverflowPolicy::DisconnectOnFull));
        assert!(!queue.push(2, None, OverflowPolicy::DisconnectOnFull));
        assert!(queue.is_disconnected());
    }
}
