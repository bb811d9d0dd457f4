//! An in-memory [`BrokerClient`] used by Router/Session/Streaming tests so those
//! components can be exercised without a network, while still going through the real
//! trait boundary (spec §9's test-tooling expectations).

use super::{
    BrokerClient, BrokerStreamHandle, LoginCredentials, OrderFilter, PositionSnapshot, Quote, SessionToken, StreamSpec,
};
use crate::codec::{validate_intent, Capabilities};
use crate::error::GatewayErrorKind;
use crate::order::{BrokerAck, BrokerOrderId, ExecutionReport, ModifyIntent, OrderIntent};
use crate::streaming::Channel;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use gateway_markets::{BrokerKind, OrderStatus, OrderType, ProductType, Symbol, TimeInForce};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Scripted response for a single `place_order` call, so tests can force rejects,
/// partial fills, or transport errors without a live broker.
#[derive(Debug, Clone)]
pub enum ScriptedAck {
    Accept(OrderStatus),
    Reject(GatewayErrorKindDup),
}

/// `GatewayErrorKind` isn't `Clone`-friendly to store pre-built inside a `Mutex` map
/// alongside `Accept` without an extra indirection; this mirrors the handful of
/// variants tests actually need to script.
#[derive(Debug, Clone)]
pub enum GatewayErrorKindDup {
    Validation(String),
    Transport { retryable: bool, reason: String },
    BrokerReject { upstream_code: String, reason: String },
}

impl From<GatewayErrorKindDup> for GatewayErrorKind {
    fn from(value: GatewayErrorKindDup) -> Self {
        match value {
            GatewayErrorKindDup::Validation(reason) => GatewayErrorKind::validation(reason),
            GatewayErrorKindDup::Transport { retryable, reason } => GatewayErrorKind::transport(retryable, reason),
            GatewayErrorKindDup::BrokerReject { upstream_code, reason } => {
                GatewayErrorKind::BrokerReject { upstream_code, reason }
            }
        }
    }
}

#[derive(Debug)]
pub struct MockBrokerClient {
    kind: BrokerKind,
    next_id: AtomicU64,
    next_stream_id: AtomicU64,
    scripted: Mutex<Vec<ScriptedAck>>,
    orders: Mutex<HashMap<String, OrderStatus>>,
    positions: Mutex<HashMap<Symbol, PositionSnapshot>>,
    streams: Mutex<HashMap<String, Vec<(Channel, Option<Symbol>)>>>,
    pub place_order_calls: AtomicU64,
}

impl MockBrokerClient {
    pub fn new(kind: BrokerKind) -> Self {
        Self {
            kind,
            next_id: AtomicU64::new(1),
            next_stream_id: AtomicU64::new(1),
            scripted: Mutex::new(Vec::new()),
            orders: Mutex::new(HashMap::new()),
            positions: Mutex::new(HashMap::new()),
            streams: Mutex::new(HashMap::new()),
            place_order_calls: AtomicU64::new(0),
        }
    }

    /// Seeds a position row so tests can exercise `get_positions` without a fill
    /// having actually gone through `place_order`.
    pub fn seed_position(&self, position: PositionSnapshot) {
        self.positions.lock().insert(position.symbol.clone(), position);
    }

    pub fn arc(kind: BrokerKind) -> Arc<Self> {
        Arc::new(Self::new(kind))
    }

    /// Queues a scripted response for the next `place_order` call (FIFO).
    pub fn script(&self, ack: ScriptedAck) {
        self.scripted.lock().push(ack);
    }
}

#[async_trait]
impl BrokerClient for MockBrokerClient {
    fn kind(&self) -> BrokerKind {
        self.kind
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            order_types: &[OrderType::Market, OrderType::Limit, OrderType::Stop, OrderType::StopLimit],
            product_types: &[ProductType::Intraday, ProductType::Delivery, ProductType::Margin],
            tifs: &[TimeInForce::Day, TimeInForce::Gtc, TimeInForce::Ioc, TimeInForce::Fok],
            native_modify: true,
            dealer_on_behalf: false,
            two_step_auth: false,
        }
    }

    async fn login(&self, _credentials: &LoginCredentials) -> Result<SessionToken, GatewayErrorKind> {
        Ok(SessionToken {
            broker_kind: self.kind,
            auth_header: "mock-token".to_string(),
            refresh_token: Some("mock-refresh".to_string()),
            expires_at: Utc::now() + ChronoDuration::hours(1),
        })
    }

    async fn refresh(&self, session: &SessionToken) -> Result<SessionToken, GatewayErrorKind> {
        let mut refreshed = session.clone();
        refreshed.expires_at = Utc::now() + ChronoDuration::hours(1);
        Ok(refreshed)
    }

    async fn logout(&self, _session: &SessionToken) -> Result<(), GatewayErrorKind> {
        Ok(())
    }

    async fn place_order(&self, _session: &SessionToken, intent: &OrderIntent) -> Result<BrokerAck, GatewayErrorKind> {
        self.place_order_calls.fetch_add(1, Ordering::SeqCst);
        validate_intent(intent, &self.capabilities())?;

        if let Some(scripted) = self.scripted.lock().pop() {
            return match scripted {
                ScriptedAck::Accept(status) => {
                    let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                    let broker_order_id = format!("MOCK-{id}");
                    self.orders.lock().insert(broker_order_id.clone(), status);
                    Ok(BrokerAck {
                        broker_order_id: BrokerOrderId::from(broker_order_id.as_str()),
                        accepted_status: status,
                    })
                }
                ScriptedAck::Reject(err) => Err(err.into()),
            };
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let broker_order_id = format!("MOCK-{id}");
        self.orders.lock().insert(broker_order_id.clone(), OrderStatus::Open);
        Ok(BrokerAck {
            broker_order_id: BrokerOrderId::from(broker_order_id.as_str()),
            accepted_status: OrderStatus::Open,
        })
    }

    async fn modify_order(&self, _session: &SessionToken, modify: &ModifyIntent) -> Result<BrokerAck, GatewayErrorKind> {
        Ok(BrokerAck {
            broker_order_id: BrokerOrderId::from(modify.order_id.0.to_string().as_str()),
            accepted_status: OrderStatus::Open,
        })
    }

    async fn cancel_order(
        &self,
        _session: &SessionToken,
        broker_order_id: &BrokerOrderId,
    ) -> Result<(), GatewayErrorKind> {
        self.orders.lock().insert(broker_order_id.0.clone(), OrderStatus::Cancelled);
        Ok(())
    }

    async fn get_order_status(
        &self,
        _session: &SessionToken,
        broker_order_id: &BrokerOrderId,
    ) -> Result<ExecutionReport, GatewayErrorKind> {
        let status = *self
            .orders
            .lock()
            .get(&broker_order_id.0)
            .ok_or_else(|| GatewayErrorKind::not_found(format!("order {broker_order_id}")))?;
        Ok(ExecutionReport {
            broker_order_id: broker_order_id.clone(),
            seq: 1,
            status,
            filled_qty: Decimal::ZERO,
            avg_price: None,
            last_fill_qty: Decimal::ZERO,
            last_fill_price: None,
            rejection_reason: None,
            timestamp: Utc::now(),
        })
    }

    async fn get_orders(
        &self,
        _session: &SessionToken,
        filter: &OrderFilter,
    ) -> Result<Vec<ExecutionReport>, GatewayErrorKind> {
        let reports = self
            .orders
            .lock()
            .iter()
            .filter(|(_, status)| filter.status.map_or(true, |wanted| wanted == **status))
            .map(|(id, status)| ExecutionReport {
                broker_order_id: BrokerOrderId::from(id.as_str()),
                seq: 1,
                status: *status,
                filled_qty: Decimal::ZERO,
                avg_price: None,
                last_fill_qty: Decimal::ZERO,
                last_fill_price: None,
                rejection_reason: None,
                timestamp: Utc::now(),
            })
            .collect();
        Ok(reports)
    }

    async fn get_positions(&self, _session: &SessionToken) -> Result<Vec<PositionSnapshot>, GatewayErrorKind> {
        Ok(self.positions.lock().values().cloned().collect())
    }

    async fn get_quote(
        &self,
        _session: &SessionToken,
        symbols: &[Symbol],
    ) -> Result<HashMap<Symbol, Quote>, GatewayErrorKind> {
        let now = Utc::now();
        Ok(symbols
            .iter()
            .cloned()
            .map(|symbol| (symbol, Quote { last_price: Decimal::from(100), timestamp: now }))
            .collect())
    }

    async fn open_stream(
        &self,
        _session: &SessionToken,
        spec: &StreamSpec,
    ) -> Result<BrokerStreamHandle, GatewayErrorKind> {
        let id = self.next_stream_id.fetch_add(1, Ordering::SeqCst);
        let handle = format!("MOCK-STREAM-{id}");
        self.streams.lock().insert(handle.clone(), spec.channels.clone());
        Ok(BrokerStreamHandle(handle))
    }

    async fn subscribe(
        &self,
        handle: &BrokerStreamHandle,
        channel: Channel,
        symbols: &[Symbol],
    ) -> Result<(), GatewayErrorKind> {
        let mut streams = self.streams.lock();
        let entries = streams
            .get_mut(&handle.0)
            .ok_or_else(|| GatewayErrorKind::not_found(format!("stream {}", handle.0)))?;
        if symbols.is_empty() {
            entries.push((channel, None));
        } else {
            entries.extend(symbols.iter().cloned().map(|symbol| (channel, Some(symbol))));
        }
        Ok(())
    }

    async fn unsubscribe(
        &self,
        handle: &BrokerStreamHandle,
        channel: Channel,
        symbols: &[Symbol],
    ) -> Result<(), GatewayErrorKind> {
        let mut streams = self.streams.lock();
        let entries = streams
            .get_mut(&handle.0)
            .ok_or_else(|| GatewayErrorKind::not_found(format!("stream {}", handle.0)))?;
        entries.retain(|(c, s)| !(*c == channel && (symbols.is_empty() || s.as_ref().is_some_and(|s| symbols.contains(s)))));
        Ok(())
    }

    async fn close_stream(&self, handle: &BrokerStreamHandle) -> Result<(), GatewayErrorKind> {
        self.streams
            .lock()
            .remove(&handle.0)
            .ok_or_else(|| GatewayErrorKind::not_found(format!("stream {}", handle.0)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_markets::{ExchangeSegment, Side};
    use rust_decimal_macros::dec;

    fn intent() -> OrderIntent {
        OrderIntent {
            client_order_id: Some("c1".into()),
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

    #[tokio::test]
    async fn place_order_accepts_by_default_and_tracks_call_count() {
        let client = MockBrokerClient::new(BrokerKind::XtsPro);
        let session = client.login(&LoginCredentials {
            api_key: "k".into(),
            api_secret: "s".into(),
            dealer_client_id: None,
            request_token: None,
        }).await.unwrap();

        let ack = client.place_order(&session, &intent()).await.unwrap();
        assert_eq!(ack.accepted_status, OrderStatus::Open);
        assert_eq!(client.place_order_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn scripted_rejection_is_returned_verbatim() {
        let client = MockBrokerClient::new(BrokerKind::XtsPro);
        client.script(ScriptedAck::Reject(GatewayErrorKindDup::BrokerReject {
            upstream_code: "E-RISK".into(),
            reason: "margin exceeded".into(),
        }));
        let session = client.login(&LoginCredentials {
            api_key: "k".into(),
            api_secret: "s".into(),
            dealer_client_id: None,
            request_token: None,
        }).await.unwrap();

        let err = client.place_order(&session, &intent()).await.unwrap_err();
        assert!(matches!(err, GatewayErrorKind::BrokerReject { .. }));
    }

    async fn session(client: &MockBrokerClient) -> SessionToken {
        client
            .login(&LoginCredentials {
                api_key: "k".into(),
                api_secret: "s".into(),
                dealer_client_id: None,
                request_token: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn get_orders_filters_by_status() {
        let client = MockBrokerClient::new(BrokerKind::XtsPro);
        let session = session(&client).await;
        client.place_order(&session, &intent()).await.unwrap();
        client.script(ScriptedAck::Accept(OrderStatus::Filled));
        client.place_order(&session, &intent()).await.unwrap();

        let filled = client
            .get_orders(&session, &OrderFilter { status: Some(OrderStatus::Filled), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(filled.len(), 1);
        assert_eq!(filled[0].status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn get_positions_returns_seeded_rows() {
        let client = MockBrokerClient::new(BrokerKind::XtsPro);
        let session = session(&client).await;
        let symbol: Symbol = "AAPL".into();
        client.seed_position(PositionSnapshot {
            symbol: symbol.clone(),
            exchange_segment: ExchangeSegment::NseEq,
            product_type: ProductType::Delivery,
            net_qty: dec!(10),
            avg_price: dec!(100),
            realized_pnl: Decimal::ZERO,
        });

        let positions = client.get_positions(&session).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].symbol, symbol);
    }

    #[tokio::test]
    async fn stream_lifecycle_tracks_subscriptions_until_closed() {
        let client = MockBrokerClient::new(BrokerKind::XtsPro);
        let session = session(&client).await;
        let symbol: Symbol = "AAPL".into();

        let handle = client.open_stream(&session, &StreamSpec::default()).await.unwrap();
        client.subscribe(&handle, Channel::Quote, &[symbol.clone()]).await.unwrap();
        client.unsubscribe(&handle, Channel::Quote, &[symbol]).await.unwrap();
        client.close_stream(&handle).await.unwrap();

        assert!(client.close_stream(&handle).await.is_err());
    }
}
