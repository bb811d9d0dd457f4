//! # Order Routing & Lifecycle Engine
//!
//! The Router (spec §4.4): validates, dispatches through the right adapter, enforces
//! at-most-once submission per `(userId, clientOrderId)`, retries transport failures
//! with backoff, short-circuits via a per-`(broker, endpoint)` circuit breaker, and
//! converges Order state from execution reports.

pub mod circuit;
pub mod reorder;
pub mod retry;

use crate::client::{BrokerClient, SessionToken};
use crate::codec::validate_intent;
use crate::error::GatewayErrorKind;
use crate::metrics::EngineMetrics;
use crate::order::report::{apply_report, ApplyOutcome};
use crate::order::{BrokerOrderId, ClientOrderId, ExecutionReport, ModifyIntent, Order, OrderId, OrderIntent};
use chrono::{DateTime, Utc};
use circuit::{Admission, CircuitBreakerRegistry, CircuitConfig};
use gateway_markets::{BrokerKind, OrderStatus, UserId};
use gateway_risk::{PreTradeGate, RiskContext, RiskRejectionCode};
use reorder::ReorderBuffer;
use retry::{retry_with_backoff, RetryPolicy};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

use crate::session::SessionManager;

/// How stale a non-terminal order's `updated_at` must be before `get` falls through
/// to a live `getOrder` poll (spec §4.4, default `engine.staleOrderThreshold` = 60 s).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub stale_order_threshold: Duration,
    pub retry_policy: RetryPolicy,
    pub circuit: CircuitConfig,
    /// `None` disables the pre-trade gate entirely (spec §4.4 names it optional
    /// ambient guidance, not a hard dependency of the routing path itself).
    pub risk_gate: Option<Arc<PreTradeGate>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stale_order_threshold: Duration::from_secs(60),
            retry_policy: RetryPolicy::default(),
            circuit: CircuitConfig::default(),
            risk_gate: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct IdempotencyKey {
    user_id: UserId,
    client_order_id: ClientOrderId,
}

pub struct Router {
    clients: HashMap<BrokerKind, Arc<dyn BrokerClient>>,
    sessions: Arc<SessionManager>,
    orders: AsyncMutex<HashMap<OrderId, Arc<AsyncMutex<Order>>>>,
    broker_order_index: AsyncMutex<HashMap<BrokerOrderId, OrderId>>,
    idempotency: AsyncMutex<HashMap<IdempotencyKey, OrderId>>,
    circuit: CircuitBreakerRegistry,
    /// Out-of-sequence execution reports awaiting a contiguous predecessor (spec §5).
    reorder: AsyncMutex<ReorderBuffer>,
    config: EngineConfig,
    pub metrics: EngineMetrics,
}

/// Snapshot returned to callers; Orders themselves are never handed out by reference
/// (spec §9: callers see immutable snapshots, the engine owns the mutable original).
pub type OrderSnapshot = Order;

impl Router {
    pub fn new(clients: Vec<Arc<dyn BrokerClient>>, sessions: Arc<SessionManager>, config: EngineConfig) -> Self {
        let clients = clients.into_iter().map(|client| (client.kind(), client)).collect();
        Self {
            clients,
            sessions,
            orders: AsyncMutex::new(HashMap::new()),
            broker_order_index: AsyncMutex::new(HashMap::new()),
            idempotency: AsyncMutex::new(HashMap::new()),
            circuit: CircuitBreakerRegistry::new(config.circuit),
            reorder: AsyncMutex::new(ReorderBuffer::new()),
            config,
            metrics: EngineMetrics::new(),
        }
    }

    fn client_for(&self, broker_kind: BrokerKind) -> Result<Arc<dyn BrokerClient>, GatewayErrorKind> {
        self.clients
            .get(&broker_kind)
            .cloned()
            .ok_or_else(|| GatewayErrorKind::internal(format!("no adapter registered for {broker_kind:?}")))
    }

    fn circuit_key(broker_kind: BrokerKind, endpoint: &str) -> String {
        format!("{broker_kind}:{endpoint}")
    }

    /// Count of this user's non-terminal orders, for the `max_outstanding_orders`
    /// pre-trade check (spec §6 `risk.maxOutstandingOrdersPerUser`).
    async fn outstanding_orders_for_user(&self, user_id: &UserId) -> usize {
        let orders = self.orders.lock().await;
        let mut count = 0;
        for order_lock in orders.values() {
            let order = order_lock.lock().await;
            if &order.user_id == user_id && !order.is_terminal() {
                count += 1;
            }
        }
        count
    }

    /// spec §4.4 `submit`: at-most-once per `(userId, clientOrderId)`. Persists NEW
    /// before the first network call, so a retried submit with the same key never
    /// dispatches twice even if the earlier attempt is still in flight or lost its ack.
    ///
    /// `last_mark` is the freshest known (price, observedAt) for `intent.symbol`, fed
    /// in by the caller (typically sourced from the Position Tracker) for the price
    /// band check; `None` skips that check (spec §9: bands only apply once a mark
    /// exists).
    pub async fn submit(
        &self,
        user_id: UserId,
        broker_kind: BrokerKind,
        intent: OrderIntent,
        now: DateTime<Utc>,
        last_mark: Option<(rust_decimal::Decimal, DateTime<Utc>)>,
    ) -> Result<OrderSnapshot, GatewayErrorKind> {
        self.metrics.record_submit();

        if let Some(risk_gate) = &self.config.risk_gate {
            let ctx = RiskContext {
                user_id: user_id.clone(),
                symbol: intent.symbol.clone(),
                side: intent.side,
                price: intent.price,
                outstanding_orders_for_user: self.outstanding_orders_for_user(&user_id).await,
                last_mark_price: last_mark.map(|(price, _)| price),
                last_mark_at: last_mark.map(|(_, at)| at),
                now,
            };
            if let Err(rejection) = risk_gate.evaluate(&ctx) {
                let reason = match rejection.code {
                    RiskRejectionCode::MaxOutstandingOrders => format!("MAX_OUTSTANDING_ORDERS: {}", rejection.reason),
                    RiskRejectionCode::PriceOutOfBand => format!("PRICE_OUT_OF_BAND: {}", rejection.reason),
                };
                return Err(GatewayErrorKind::validation(reason));
            }
        }

        if let Some(client_order_id) = intent.client_order_id.clone() {
            let key = IdempotencyKey {
                user_id: user_id.clone(),
                client_order_id,
            };
            let mut idempotency = self.idempotency.lock().await;
            if let Some(existing_id) = idempotency.get(&key).copied() {
                drop(idempotency);
                self.metrics.record_idempotency_hit();
                return self.get(existing_id, now).await;
            }

            let order = Order::new(user_id.clone(), broker_kind, &intent, now);
            let order_id = order.order_id;
            idempotency.insert(key, order_id);
            drop(idempotency);
            self.orders.lock().await.insert(order_id, Arc::new(AsyncMutex::new(order)));
            self.dispatch_submit(order_id, broker_kind, intent, now).await
        } else {
            let order = Order::new(user_id, broker_kind, &intent, now);
            let order_id = order.order_id;
            self.orders.lock().await.insert(order_id, Arc::new(AsyncMutex::new(order)));
            self.dispatch_submit(order_id, broker_kind, intent, now).await
        }
    }

    async fn dispatch_submit(
        &self,
        order_id: OrderId,
        broker_kind: BrokerKind,
        intent: OrderIntent,
        now: DateTime<Utc>,
    ) -> Result<OrderSnapshot, GatewayErrorKind> {
        let client = self.client_for(broker_kind)?;
        validate_intent(&intent, &client.capabilities())?;

        let user_id = {
            let orders = self.orders.lock().await;
            let order_lock = orders.get(&order_id).cloned().expect("order inserted before dispatch");
            drop(orders);
            order_lock.lock().await.user_id.clone()
        };

        let key = Self::circuit_key(broker_kind, "orders");
        if self.circuit.admit(&key) == Admission::ShortCircuit {
            self.metrics.record_circuit_short_circuit();
            return Err(GatewayErrorKind::Unavailable { endpoint: key });
        }

        let session = self.sessions.session_for(user_id.clone(), broker_kind).await?;
        let ack = match self.place_with_retry(&client, &session, &intent).await {
            Ok(ack) => {
                self.circuit.record_success(&key);
                ack
            }
            Err(GatewayErrorKind::Auth { .. }) => {
                // spec §4.4/§7: a single refresh+retry on auth failure before surfacing.
                let refreshed = self.sessions.session_for(user_id, broker_kind).await?;
                match self.place_with_retry(&client, &refreshed, &intent).await {
                    Ok(ack) => {
                        self.circuit.record_success(&key);
                        ack
                    }
                    Err(err) => {
                        self.circuit.record_failure(&key);
                        return Err(err);
                    }
                }
            }
            Err(err) => {
                self.circuit.record_failure(&key);
                return Err(err);
            }
        };

        let orders = self.orders.lock().await;
        let order_lock = orders.get(&order_id).cloned().expect("order inserted before dispatch");
        drop(orders);
        let mut order = order_lock.lock().await;
        order.status = ack.accepted_status;
        order.broker_order_id = Some(ack.broker_order_id.clone());
        order.updated_at = now;
        let snapshot = order.clone();
        drop(order);

        self.broker_order_index.lock().await.insert(ack.broker_order_id, order_id);
        Ok(snapshot)
    }

    async fn place_with_retry(
        &self,
        client: &Arc<dyn BrokerClient>,
        session: &SessionToken,
        intent: &OrderIntent,
    ) -> Result<crate::order::BrokerAck, GatewayErrorKind> {
        retry_with_backoff(&self.config.retry_policy, || client.place_order(session, intent)).await
    }

    /// spec §4.4 `modify`: only valid on OPEN/PARTIALLY_FILLED orders. Adapters that
    /// declare `native_modify = false` can't apply this in place; the caller must
    /// cancel and resubmit with `replaces_order_id` set (Zerodha notes, §4.7).
    pub async fn modify(&self, order_id: OrderId, modify: ModifyIntent, now: DateTime<Utc>) -> Result<OrderSnapshot, GatewayErrorKind> {
        let orders = self.orders.lock().await;
        let order_lock = orders
            .get(&order_id)
            .cloned()
            .ok_or_else(|| GatewayErrorKind::not_found(format!("order {order_id}")))?;
        drop(orders);

        let (broker_kind, user_id) = {
            let order = order_lock.lock().await;
            if !matches!(order.status, OrderStatus::Open | OrderStatus::PartiallyFilled) {
                return Err(GatewayErrorKind::state(format!(
                    "cannot modify order in status {:?}",
                    order.status
                )));
            }
            (order.broker_kind, order.user_id.clone())
        };

        let client = self.client_for(broker_kind)?;
        if !client.capabilities().native_modify {
            return Err(GatewayErrorKind::state(
                "this adapter does not support native modify; cancel and resubmit instead",
            ));
        }

        let session = self.sessions.session_for(user_id, broker_kind).await?;
        let ack = retry_with_backoff(&self.config.retry_policy, || client.modify_order(&session, &modify)).await?;

        let mut order = order_lock.lock().await;
        if let Some(new_qty) = modify.new_qty {
            order.qty = new_qty;
        }
        if let Some(new_price) = modify.new_price {
            order.price = Some(new_price);
        }
        order.status = ack.accepted_status;
        order.updated_at = now;
        Ok(order.clone())
    }

    /// spec §4.4 `cancel`: idempotent. Cancelling an already-terminal order returns
    /// its terminal status without error rather than failing.
    pub async fn cancel(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<OrderSnapshot, GatewayErrorKind> {
        let orders = self.orders.lock().await;
        let order_lock = orders
            .get(&order_id)
            .cloned()
            .ok_or_else(|| GatewayErrorKind::not_found(format!("order {order_id}")))?;
        drop(orders);

        let (broker_kind, user_id, broker_order_id, already_terminal) = {
            let order = order_lock.lock().await;
            (
                order.broker_kind,
                order.user_id.clone(),
                order.broker_order_id.clone(),
                order.is_terminal(),
            )
        };

        if already_terminal {
            return Ok(order_lock.lock().await.clone());
        }

        let Some(broker_order_id) = broker_order_id else {
            // Never acked: nothing upstream to cancel. Mark locally cancelled.
            let mut order = order_lock.lock().await;
            order.status = OrderStatus::Cancelled;
            order.updated_at = now;
            return Ok(order.clone());
        };

        let client = self.client_for(broker_kind)?;
        let session = self.sessions.session_for(user_id, broker_kind).await?;
        retry_with_backoff(&self.config.retry_policy, || client.cancel_order(&session, &broker_order_id)).await?;

        Ok(order_lock.lock().await.clone())
    }

    /// spec §4.4 `get`: reads engine state; falls through to a live poll if the order
    /// is non-terminal and stale.
    pub async fn get(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<OrderSnapshot, GatewayErrorKind> {
        let orders = self.orders.lock().await;
        let order_lock = orders
            .get(&order_id)
            .cloned()
            .ok_or_else(|| GatewayErrorKind::not_found(format!("order {order_id}")))?;
        drop(orders);

        let needs_poll = {
            let order = order_lock.lock().await;
            !order.is_terminal()
                && order.broker_order_id.is_some()
                && (now - order.updated_at)
                    .to_std()
                    .map(|age| age >= self.config.stale_order_threshold)
                    .unwrap_or(false)
        };

        if needs_poll {
            let (broker_kind, user_id, broker_order_id) = {
                let order = order_lock.lock().await;
                (order.broker_kind, order.user_id.clone(), order.broker_order_id.clone().unwrap())
            };
            if let Ok(client) = self.client_for(broker_kind) {
                if let Ok(session) = self.sessions.session_for(user_id, broker_kind).await {
                    if let Ok(report) = client.get_order_status(&session, &broker_order_id).await {
                        let mut order = order_lock.lock().await;
                        apply_report(&mut order, &report, now);
                    }
                }
            }
        }

        Ok(order_lock.lock().await.clone())
    }

    /// Feeds an execution report (from the Streaming Hub or the reconciler) through
    /// the shared ingestion path (spec §4.4 ingestion, invariants I1-I3/P2/P3/P8).
    ///
    /// A report that arrives ahead of the next expected sequence is held in the
    /// reorder buffer rather than discarded (spec §5); once its predecessor lands —
    /// here or via [`Router::flush_expired_reorder_buffers`] — every now-contiguous
    /// buffered report is applied in order in the same call. Returns the order
    /// snapshot alongside the outcome of the last report actually applied (the
    /// just-arrived one if it was buffered, i.e. [`ApplyOutcome::Discarded`]).
    pub async fn apply_execution_report(
        &self,
        report: ExecutionReport,
        now: DateTime<Utc>,
    ) -> Result<(OrderSnapshot, ApplyOutcome), GatewayErrorKind> {
        let order_id = self
            .broker_order_index
            .lock()
            .await
            .get(&report.broker_order_id)
            .copied()
            .ok_or_else(|| GatewayErrorKind::not_found(format!("order for broker_order_id {}", report.broker_order_id)))?;

        let order_lock = self
            .orders
            .lock()
            .await
            .get(&order_id)
            .cloned()
            .ok_or_else(|| GatewayErrorKind::not_found(format!("order {order_id}")))?;

        let mut order = order_lock.lock().await;

        if report.seq > order.last_applied_seq + 1 {
            self.reorder.lock().await.hold(order_id, report, now);
            return Ok((order.clone(), ApplyOutcome::Discarded));
        }

        let mut outcome = apply_report(&mut order, &report, now);
        loop {
            let ready = self.reorder.lock().await.take_contiguous(order_id, order.last_applied_seq);
            if ready.is_empty() {
                break;
            }
            for buffered in ready {
                outcome = apply_report(&mut order, &buffered, now);
            }
        }

        Ok((order.clone(), outcome))
    }

    /// Applies any held out-of-sequence reports whose 2 s flush timeout has elapsed,
    /// in sequence order, despite the unresolved gap (spec §5). Intended to be driven
    /// by a periodic background tick alongside the reconciler sweep.
    pub async fn flush_expired_reorder_buffers(&self, now: DateTime<Utc>) {
        let expired = self.reorder.lock().await.take_expired(now);
        for (order_id, reports) in expired {
            let order_lock = {
                let orders = self.orders.lock().await;
                orders.get(&order_id).cloned()
            };
            let Some(order_lock) = order_lock else { continue };
            let mut order = order_lock.lock().await;
            for report in reports {
                apply_report(&mut order, &report, now);
            }
        }
    }

    /// Non-terminal orders whose `updated_at` is older than the stale threshold, for
    /// the reconciler sweep (spec §4.4).
    pub async fn stale_order_ids(&self, now: DateTime<Utc>) -> Vec<OrderId> {
        let orders = self.orders.lock().await;
        let mut stale = Vec::new();
        for (id, order_lock) in orders.iter() {
            let order = order_lock.lock().await;
            if !order.is_terminal()
                && (now - order.updated_at)
                    .to_std()
                    .map(|age| age >= self.config.stale_order_threshold)
                    .unwrap_or(false)
            {
                stale.push(*id);
            }
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockBrokerClient;
    use crate::client::LoginCredentials;
    use gateway_markets::{ExchangeSegment, OrderType, ProductType, Side, TimeInForce};
    use gateway_risk::MaxOutstandingOrdersCheck;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn intent(client_order_id: Option<&str>) -> OrderIntent {
        OrderIntent {
            client_order_id: client_order_id.map(ClientOrderId::from),
            symbol: "AAPL".into(),
            exchange_segment: ExchangeSegment::NseEq,
            side: Side::Buy,
            order_type: OrderType::Limit,
            qty: dec!(10),
            price: Some(dec!(100)),
            stop_price: None,
            product_type: ProductType::Delivery,
            tif: TimeInForce::Gtc,
        }
    }

    async fn router_with_logged_in_mock() -> (Router, UserId) {
        let client: Arc<dyn BrokerClient> = MockBrokerClient::arc(BrokerKind::XtsPro);
        let sessions = Arc::new(SessionManager::new(vec![client.clone()]));
        let user_id = UserId::from("u1");
        sessions
            .login(
                user_id.clone(),
                BrokerKind::XtsPro,
                LoginCredentials {
                    api_key: "k".into(),
                    api_secret: "s".into(),
                    dealer_client_id: None,
                    request_token: None,
                },
            )
            .await
            .unwrap();
        (Router::new(vec![client], sessions, EngineConfig::default()), user_id)
    }

    #[tokio::test]
    async fn happy_path_submit_returns_an_open_order() {
        let (router, user_id) = router_with_logged_in_mock().await;
        let now = Utc::now();
        let order = router
            .submit(user_id, BrokerKind::XtsPro, intent(Some("c1")), now, None)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Open);
        assert!(order.broker_order_id.is_some());
    }

    /// spec §8 scenario #2: a duplicate submit with the same `(userId, clientOrderId)`
    /// returns the existing order without dispatching a second upstream call.
    #[tokio::test]
    async fn duplicate_submit_with_same_client_order_id_hits_idempotency_cache() {
        let (router, user_id) = router_with_logged_in_mock().await;
        let now = Utc::now();

        let first = router
            .submit(user_id.clone(), BrokerKind::XtsPro, intent(Some("dup-1")), now, None)
            .await
            .unwrap();
        let second = router
            .submit(user_id, BrokerKind::XtsPro, intent(Some("dup-1")), now, None)
            .await
            .unwrap();

        assert_eq!(first.order_id, second.order_id);
        assert_eq!(router.metrics.idempotency_hits(), 1);
    }

    /// spec §8 scenario #3 shape: the pre-trade gate rejects before any dispatch, and
    /// the error carries the `MAX_OUTSTANDING_ORDERS`/`PRICE_OUT_OF_BAND` sub-code.
    #[tokio::test]
    async fn risk_gate_rejection_surfaces_as_a_validation_error_before_dispatch() {
        let client: Arc<dyn BrokerClient> = MockBrokerClient::arc(BrokerKind::XtsPro);
        let sessions = Arc::new(SessionManager::new(vec![client.clone()]));
        let user_id = UserId::from("u1");
        sessions
            .login(
                user_id.clone(),
                BrokerKind::XtsPro,
                LoginCredentials {
                    api_key: "k".into(),
                    api_secret: "s".into(),
                    dealer_client_id: None,
                    request_token: None,
                },
            )
            .await
            .unwrap();

        let gate = Arc::new(PreTradeGate::new(vec![Box::new(MaxOutstandingOrdersCheck { max: 0 })]));
        let config = EngineConfig {
            risk_gate: Some(gate),
            ..EngineConfig::default()
        };
        let router = Router::new(vec![client], sessions, config);

        let err = router
            .submit(user_id, BrokerKind::XtsPro, intent(Some("c1")), Utc::now(), None)
            .await
            .unwrap_err();

        match err {
            GatewayErrorKind::Validation { reason } => assert!(reason.contains("MAX_OUTSTANDING_ORDERS")),
            other => panic!("expected a validation rejection, got {other:?}"),
        }
    }

    fn execution_report(
        broker_order_id: &str,
        seq: u64,
        last_fill_qty: Decimal,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> ExecutionReport {
        ExecutionReport {
            broker_order_id: broker_order_id.into(),
            seq,
            status,
            filled_qty: Decimal::ZERO,
            avg_price: None,
            last_fill_qty,
            last_fill_price: Some(dec!(100)),
            rejection_reason: None,
            timestamp: now,
        }
    }

    /// spec §8's out-of-sequence boundary scenario: a report that arrives ahead of the
    /// next expected sequence is held, not discarded, and is replayed once its
    /// predecessor lands.
    #[tokio::test]
    async fn out_of_sequence_report_is_buffered_then_replayed_in_order() {
        let (router, user_id) = router_with_logged_in_mock().await;
        let now = Utc::now();
        let order = router
            .submit(user_id, BrokerKind::XtsPro, intent(Some("c1")), now, None)
            .await
            .unwrap();
        let broker_order_id = order.broker_order_id.clone().unwrap();

        let (ahead, outcome) = router
            .apply_execution_report(
                execution_report(&broker_order_id.0, 2, dec!(4), OrderStatus::PartiallyFilled, now),
                now,
            )
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Discarded);
        assert_eq!(ahead.filled_qty, Decimal::ZERO); // not yet applied, only buffered

        let (converged, outcome) = router
            .apply_execution_report(
                execution_report(&broker_order_id.0, 1, dec!(3), OrderStatus::PartiallyFilled, now),
                now,
            )
            .await
            .unwrap();
        assert!(matches!(outcome, ApplyOutcome::Applied { .. }));
        assert_eq!(converged.filled_qty, dec!(7)); // seq 1 (3) then chained seq 2 (4)
        assert_eq!(converged.last_applied_seq, 2);
    }

    /// spec §5: a gap that outlives the 2 s flush timeout is applied anyway rather
    /// than held indefinitely.
    #[tokio::test]
    async fn expired_reorder_buffer_is_flushed_despite_the_gap() {
        let (router, user_id) = router_with_logged_in_mock().await;
        let now = Utc::now();
        let order = router
            .submit(user_id, BrokerKind::XtsPro, intent(Some("c1")), now, None)
            .await
            .unwrap();
        let broker_order_id = order.broker_order_id.clone().unwrap();

        router
            .apply_execution_report(
                execution_report(&broker_order_id.0, 3, dec!(5), OrderStatus::PartiallyFilled, now),
                now,
            )
            .await
            .unwrap();

        let later = now + chrono::Duration::seconds(3);
        router.flush_expired_reorder_buffers(later).await;

        let converged = router.get(order.order_id, later).await.unwrap();
        assert_eq!(converged.filled_qty, dec!(5));
        assert_eq!(converged.last_applied_seq, 3);
    }
}
