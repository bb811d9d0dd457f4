//! # Streaming Hub
//!
//! Per `(userId, brokerKind)` it owns one upstream `StreamHandle` and multiplexes
//! quote/order/position events to many downstream subscribers with per-symbol
//! subscription refcounts (spec §4.6, invariants I6/P5/P7).

use crate::transport::{EntityKey, HeartbeatMonitor, OverflowPolicy, ReconnectBackoff, SubscriberQueue};
use gateway_markets::{BrokerKind, Symbol, UserId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Span name entered on every `publish` call. Fires once per market tick fanned out,
/// so default logging filters it out (see `gateway_core::logging::init_logging`).
pub const STREAM_FANOUT_SPAN_NAME: &str = "stream_fanout";

/// A tagged event flowing through the Hub to downstream subscribers (spec §9: prefer
/// tagged variants over inheritance for Hub message types).
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    Quote { symbol: Symbol, price: rust_decimal::Decimal },
    OrderUpdate { order_id: crate::order::OrderId, status: gateway_markets::OrderStatus },
    PositionUpdate { symbol: Symbol },
    StreamResumed { last_known_seq: u64 },
    Error { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Quote,
    OrderUpdate,
    PositionUpdate,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SubscriptionKey {
    channel: Channel,
    symbol: Option<Symbol>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Connected,
    Reconnecting,
}

/// Why a subscriber got disconnected from its queue overflowing (spec §8 scenario #6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    SlowConsumer,
}

impl CloseReason {
    /// The literal close code the spec names (spec §8 scenario #6: `SLOW_CONSUMER`).
    pub fn code(&self) -> &'static str {
        match self {
            CloseReason::SlowConsumer => "SLOW_CONSUMER",
        }
    }
}

/// Maps a [`HubEvent`] to the overflow policy and entity key its queue push should use
/// (spec §4.6): quote ticks coalesce per symbol, order/position events dedupe per
/// entity and never coalesce across distinct entities, control events never coalesce.
fn overflow_routing(event: &HubEvent) -> (OverflowPolicy, Option<EntityKey>) {
    match event {
        HubEvent::Quote { symbol, .. } => (OverflowPolicy::CoalesceBySymbol, Some(EntityKey(symbol.0.to_string()))),
        HubEvent::OrderUpdate { order_id, .. } => (OverflowPolicy::DedupeByEntity, Some(EntityKey(order_id.0.to_string()))),
        HubEvent::PositionUpdate { symbol } => (OverflowPolicy::DedupeByEntity, Some(EntityKey(symbol.0.to_string()))),
        HubEvent::StreamResumed { .. } | HubEvent::Error { .. } => (OverflowPolicy::DisconnectOnFull, None),
    }
}

struct Subscriber {
    queue: SubscriberQueue<HubEvent>,
    subscriptions: Vec<SubscriptionKey>,
}

/// One upstream connection's bookkeeping for a `(userId, brokerKind)` pair: refcounts
/// per subscription key, the set of subscribers multiplexed onto it, and reconnect
/// state (spec §4.2, §4.6).
pub struct StreamHandle {
    pub user_id: UserId,
    pub broker_kind: BrokerKind,
    state: Mutex<StreamState>,
    refcounts: Mutex<HashMap<SubscriptionKey, u64>>,
    subscribers: Mutex<HashMap<SubscriberId, Subscriber>>,
    next_subscriber_id: AtomicU64,
    backoff: Mutex<ReconnectBackoff>,
    heartbeat: Mutex<HeartbeatMonitor>,
    queue_capacity: usize,
}

/// Outcome of a subscribe/unsubscribe call: whether the upstream connection needs to
/// (un)subscribe, per the 0->1 / 1->0 edge-triggering rule (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamAction {
    None,
    Subscribe,
    Unsubscribe,
}

impl StreamHandle {
    pub fn new(user_id: UserId, broker_kind: BrokerKind, queue_capacity: usize) -> Self {
        Self {
            user_id,
            broker_kind,
            state: Mutex::new(StreamState::Connected),
            refcounts: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(HashMap::new()),
            next_subscriber_id: AtomicU64::new(1),
            backoff: Mutex::new(ReconnectBackoff::new(Duration::from_secs(1), Duration::from_secs(30))),
            heartbeat: Mutex::new(HeartbeatMonitor::new(Duration::from_secs(60))),
            queue_capacity,
        }
    }

    pub fn add_subscriber(&self) -> SubscriberId {
        let id = SubscriberId(self.next_subscriber_id.fetch_add(1, Ordering::SeqCst));
        self.subscribers.lock().insert(
            id,
            Subscriber {
                queue: SubscriberQueue::new(self.queue_capacity),
                subscriptions: Vec::new(),
            },
        );
        id
    }

    pub fn remove_subscriber(&self, id: SubscriberId) {
        if let Some(subscriber) = self.subscribers.lock().remove(&id) {
            let mut refcounts = self.refcounts.lock();
            for key in subscriber.subscriptions {
                if let Some(count) = refcounts.get_mut(&key) {
                    *count = count.saturating_sub(1);
                }
            }
        }
    }

    /// spec §4.6: increments a refcount; the upstream subscribe is issued only on the
    /// 0->1 transition (invariant I6).
    pub fn subscribe(&self, subscriber_id: SubscriberId, channel: Channel, symbol: Option<Symbol>) -> UpstreamAction {
        let key = SubscriptionKey { channel, symbol };
        let mut refcounts = self.refcounts.lock();
        let count = refcounts.entry(key.clone()).or_insert(0);
        *count += 1;
        let action = if *count == 1 {
            UpstreamAction::Subscribe
        } else {
            UpstreamAction::None
        };
        drop(refcounts);

        if let Some(subscriber) = self.subscribers.lock().get_mut(&subscriber_id) {
            subscriber.subscriptions.push(key);
        }
        action
    }

    /// spec §4.6: decrements a refcount; upstream unsubscribe only on the 1->0
    /// transition.
    pub fn unsubscribe(&self, subscriber_id: SubscriberId, channel: Channel, symbol: Option<Symbol>) -> UpstreamAction {
        let key = SubscriptionKey { channel, symbol };
        let mut refcounts = self.refcounts.lock();
        let action = match refcounts.get_mut(&key) {
            Some(count) if *count > 0 => {
                *count -= 1;
                if *count == 0 {
                    UpstreamAction::Unsubscribe
                } else {
                    UpstreamAction::None
                }
            }
            _ => UpstreamAction::None,
        };
        drop(refcounts);

        if let Some(subscriber) = self.subscribers.lock().get_mut(&subscriber_id) {
            subscriber.subscriptions.retain(|k| k != &key);
        }
        action
    }

    pub fn refcount(&self, channel: Channel, symbol: Option<Symbol>) -> u64 {
        self.refcounts
            .lock()
            .get(&SubscriptionKey { channel, symbol })
            .copied()
            .unwrap_or(0)
    }

    /// Active upstream subscriptions: every key with refcount > 0 (invariant I6; this
    /// is exactly what a reconnect must replay, spec §4.6/P7).
    pub fn active_subscriptions(&self) -> Vec<(Channel, Option<Symbol>)> {
        self.refcounts
            .lock()
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(key, _)| (key.channel, key.symbol.clone()))
            .collect()
    }

    /// Non-blocking fan-out to every subscriber whose subscriptions match the event's
    /// channel/symbol (spec §5 fairness: a slow subscriber cannot stall delivery to
    /// others). Returns the IDs (with close reason) of subscribers whose queue
    /// overflowed into a disconnect this call (spec §8 scenario #6: `SLOW_CONSUMER`).
    pub fn publish(&self, channel: Channel, symbol: Option<&Symbol>, event: HubEvent) -> Vec<(SubscriberId, CloseReason)> {
        let _span = tracing::trace_span!(STREAM_FANOUT_SPAN_NAME, ?channel).entered();
        let (policy, key) = overflow_routing(&event);
        let mut disconnected = Vec::new();
        let mut subscribers = self.subscribers.lock();
        for (id, subscriber) in subscribers.iter_mut() {
            let matches = subscriber.subscriptions.iter().any(|key| {
                key.channel == channel && (key.symbol.is_none() || key.symbol.as_ref() == symbol)
            });
            if matches && !subscriber.queue.push(event.clone(), key.clone(), policy) {
                tracing::warn!(subscriber = id.0, user_id = %self.user_id, reason = CloseReason::SlowConsumer.code(), "disconnecting slow subscriber: queue overflow");
                disconnected.push((*id, CloseReason::SlowConsumer));
            }
        }
        disconnected
    }

    pub fn drain(&self, subscriber_id: SubscriberId) -> Vec<HubEvent> {
        let mut subscribers = self.subscribers.lock();
        let Some(subscriber) = subscribers.get_mut(&subscriber_id) else {
            return Vec::new();
        };
        let mut events = Vec::new();
        while let Some(event) = subscriber.queue.pop() {
            events.push(event);
        }
        events
    }

    pub fn touch_heartbeat(&self) {
        self.heartbeat.lock().touch();
    }

    pub fn is_stalled(&self) -> bool {
        self.heartbeat.lock().is_stalled()
    }

    pub fn state(&self) -> StreamState {
        *self.state.lock()
    }

    /// spec §4.6 reconnect: transitions to Reconnecting and returns the backoff delay
    /// bound for the next attempt.
    pub fn begin_reconnect(&self) -> Duration {
        *self.state.lock() = StreamState::Reconnecting;
        self.backoff.lock().next_delay_bound()
    }

    /// Call once the upstream connection is re-established: resets backoff, marks
    /// Connected, and returns the subscription set that must be replayed upstream
    /// (spec §4.6 step 1) plus a `StreamResumed` event to broadcast (step 2).
    pub fn complete_reconnect(&self, last_known_seq: u64) -> (Vec<(Channel, Option<Symbol>)>, HubEvent) {
        self.backoff.lock().reset();
        self.heartbeat.lock().touch();
        *self.state.lock() = StreamState::Connected;
        let resubscriptions = self.active_subscriptions();
        let event = HubEvent::StreamResumed { last_known_seq };
        let (policy, key) = overflow_routing(&event);
        for (_, subscriber) in self.subscribers.lock().iter_mut() {
            subscriber.queue.push(event.clone(), key.clone(), policy);
        }
        (resubscriptions, event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn handle() -> StreamHandle {
        StreamHandle::new(UserId::from("u1"), BrokerKind::XtsPro, 4)
    }

    #[test]
    fn subscribe_issues_upstream_action_only_on_zero_to_one_p5() {
        let hub = handle();
        let s1 = hub.add_subscriber();
        let s2 = hub.add_subscriber();
        let symbol: Symbol = "AAPL".into();

        assert_eq!(hub.subscribe(s1, Channel::Quote, Some(symbol.clone())), UpstreamAction::Subscribe);
        assert_eq!(hub.subscribe(s2, Channel::Quote, Some(symbol.clone())), UpstreamAction::None);
        assert_eq!(hub.refcount(Channel::Quote, Some(symbol)), 2);
    }

    #[test]
    fn unsubscribe_issues_upstream_action_only_on_one_to_zero() {
        let hub = handle();
        let s1 = hub.add_subscriber();
        let symbol: Symbol = "AAPL".into();

        hub.subscribe(s1, Channel::Quote, Some(symbol.clone()));
        assert_eq!(hub.unsubscribe(s1, Channel::Quote, Some(symbol.clone())), UpstreamAction::Unsubscribe);
        assert_eq!(hub.refcount(Channel::Quote, Some(symbol)), 0);
    }

    #[test]
    fn removing_a_subscriber_decrements_its_refcounts() {
        let hub = handle();
        let s1 = hub.add_subscriber();
        let symbol: Symbol = "AAPL".into();
        hub.subscribe(s1, Channel::Quote, Some(symbol.clone()));
        hub.remove_subscriber(s1);
        assert_eq!(hub.refcount(Channel::Quote, Some(symbol)), 0);
    }

    #[test]
    fn reconnect_replays_exactly_the_pre_drop_subscription_set_p7() {
        let hub = handle();
        let s1 = hub.add_subscriber();
        let aapl: Symbol = "AAPL".into();
        let msft: Symbol = "MSFT".into();
        hub.subscribe(s1, Channel::Quote, Some(aapl.clone()));
        hub.subscribe(s1, Channel::Quote, Some(msft.clone()));

        hub.begin_reconnect();
        assert_eq!(hub.state(), StreamState::Reconnecting);

        let (resubscriptions, event) = hub.complete_reconnect(42);
        assert_eq!(hub.state(), StreamState::Connected);
        assert!(matches!(event, HubEvent::StreamResumed { last_known_seq: 42 }));

        let mut symbols: Vec<_> = resubscriptions.into_iter().map(|(_, sym)| sym.unwrap()).collect();
        symbols.sort_by_key(|s| s.0.clone());
        assert_eq!(symbols, vec![aapl, msft]);
    }

    #[test]
    fn publish_is_non_blocking_for_other_subscribers_when_one_overflows() {
        let hub = StreamHandle::new(UserId::from("u1"), BrokerKind::XtsPro, 1);
        let slow = hub.add_subscriber();
        let fast = hub.add_subscriber();
        let symbol: Symbol = "AAPL".into();
        hub.subscribe(slow, Channel::Quote, Some(symbol.clone()));
        hub.subscribe(fast, Channel::Quote, Some(symbol.clone()));

        for i in 0..3 {
            hub.publish(
                Channel::Quote,
                Some(&symbol),
                HubEvent::Quote { symbol: symbol.clone(), price: dec!(100) + rust_decimal::Decimal::from(i) },
            );
        }

        let fast_events = hub.drain(fast);
        assert!(!fast_events.is_empty());
    }

    /// spec §4.6: a later quote tick for the same symbol coalesces into the one
    /// already queued rather than overflowing the queue at all.
    #[test]
    fn same_symbol_quote_ticks_coalesce_instead_of_overflowing() {
        let hub = StreamHandle::new(UserId::from("u1"), BrokerKind::XtsPro, 1);
        let sub = hub.add_subscriber();
        let symbol: Symbol = "AAPL".into();
        hub.subscribe(sub, Channel::Quote, Some(symbol.clone()));

        for i in 0..3 {
            let disconnected = hub.publish(
                Channel::Quote,
                Some(&symbol),
                HubEvent::Quote { symbol: symbol.clone(), price: dec!(100) + rust_decimal::Decimal::from(i) },
            );
            assert!(disconnected.is_empty());
        }

        let events = hub.drain(sub);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], HubEvent::Quote { price, .. } if price == dec!(102)));
    }

    /// spec §4.6: order updates for distinct orders are never coalesced against one
    /// another; once the queue is full of unrelated entities, the subscriber is
    /// disconnected (spec §8 scenario #6).
    #[test]
    fn order_updates_for_distinct_orders_never_coalesce_and_overflow_disconnects() {
        use gateway_markets::OrderStatus;

        let hub = StreamHandle::new(UserId::from("u1"), BrokerKind::XtsPro, 1);
        let sub = hub.add_subscriber();
        hub.subscribe(sub, Channel::OrderUpdate, None);

        let order_a = crate::order::OrderId(uuid::Uuid::new_v4());
        let order_c = crate::order::OrderId(uuid::Uuid::new_v4());

        let first = hub.publish(
            Channel::OrderUpdate,
            None,
            HubEvent::OrderUpdate { order_id: order_a, status: OrderStatus::New },
        );
        assert!(first.is_empty());

        let second = hub.publish(
            Channel::OrderUpdate,
            None,
            HubEvent::OrderUpdate { order_id: order_c, status: OrderStatus::New },
        );
        assert_eq!(second, vec![(sub, CloseReason::SlowConsumer)]);
        assert_eq!(CloseReason::SlowConsumer.code(), "SLOW_CONSUMER");

        // the order-a update that was already queued survives the overflow.
        let events = hub.drain(sub);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], HubEvent::OrderUpdate { order_id, .. } if order_id == order_a));
    }
}
