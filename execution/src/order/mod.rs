//! Order entities, the status state machine, and the `OrderIntent` the Router accepts
//! from callers (spec §3, §4.1).

pub mod report;

use chrono::{DateTime, Utc};
use gateway_markets::{BrokerKind, ExchangeSegment, OrderStatus, OrderType, ProductType, Side, Symbol, TimeInForce, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use report::ExecutionReport;

/// System-generated order identifier. Stable for the lifetime of the order; returned
/// from `submit` and used by every subsequent `modify`/`cancel`/`get`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-supplied idempotency key, unique per user (invariant I7).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientOrderId(pub String);

impl From<&str> for ClientOrderId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Broker-assigned order identifier, present from the moment of broker-ack.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrokerOrderId(pub String);

impl From<&str> for BrokerOrderId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for BrokerOrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a caller asks the Router to place. Validated by the adapter's codec before
/// dispatch (qty <= 0, LIMIT without price, STOP/STOP_LIMIT without stop_price, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub client_order_id: Option<ClientOrderId>,
    pub symbol: Symbol,
    pub exchange_segment: ExchangeSegment,
    pub side: Side,
    pub order_type: OrderType,
    pub qty: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub product_type: ProductType,
    pub tif: TimeInForce,
}

/// What a caller asks the Router to change on an OPEN/PARTIALLY_FILLED order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifyIntent {
    pub order_id: OrderId,
    pub new_qty: Option<Decimal>,
    pub new_price: Option<Decimal>,
}

/// What an adapter returns once the broker has accepted an order/modify/cancel for
/// processing (not yet executed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerAck {
    pub broker_order_id: BrokerOrderId,
    pub accepted_status: OrderStatus,
}

/// The system's view of an order, mutated only by the Order Engine (invariant I4: one
/// owning adapter, `broker_kind` immutable post-creation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub client_order_id: Option<ClientOrderId>,
    pub user_id: UserId,
    pub broker_kind: BrokerKind,
    pub symbol: Symbol,
    pub exchange_segment: ExchangeSegment,
    pub side: Side,
    pub order_type: OrderType,
    pub qty: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub product_type: ProductType,
    pub tif: TimeInForce,
    pub status: OrderStatus,
    pub filled_qty: Decimal,
    pub avg_fill_price: Option<Decimal>,
    pub broker_order_id: Option<BrokerOrderId>,
    /// Set when a modify was materialised by the adapter as cancel+replace (spec §4.4,
    /// §4.7 Zerodha notes): this order is the replacement, linked back to the original.
    pub replaces_order_id: Option<OrderId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Highest applied `ExecutionReport` sequence for this order, used to reject
    /// stale/duplicate reports (invariant P8).
    pub last_applied_seq: u64,
}

impl Order {
    pub fn new(user_id: UserId, broker_kind: BrokerKind, intent: &OrderIntent, now: DateTime<Utc>) -> Self {
        Self {
            order_id: OrderId::new(),
            client_order_id: intent.client_order_id.clone(),
            user_id,
            broker_kind,
            symbol: intent.symbol.clone(),
            exchange_segment: intent.exchange_segment.clone(),
            side: intent.side,
            order_type: intent.order_type,
            qty: intent.qty,
            price: intent.price,
            stop_price: intent.stop_price,
            product_type: intent.product_type,
            tif: intent.tif,
            status: OrderStatus::New,
            filled_qty: Decimal::ZERO,
            avg_fill_price: None,
            broker_order_id: None,
            replaces_order_id: None,
            created_at: now,
            updated_at: now,
            last_applied_seq: 0,
        }
    }

    pub fn remaining_qty(&self) -> Decimal {
        self.qty - self.filled_qty
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_markets::{ExchangeSegment as Seg, ProductType, TimeInForce};
    use rust_decimal_macros::dec;

    fn sample_intent() -> OrderIntent {
        OrderIntent {
            client_order_id: Some("c1".into()),
            symbol: "AAPL".into(),
            exchange_segment: Seg::NseEq,
            side: Side::Buy,
            order_type: OrderType::Limit,
            qty: dec!(10),
            price: Some(dec!(175.50)),
            stop_price: None,
            product_type: ProductType::Delivery,
            tif: TimeInForce::Gtc,
        }
    }

    #[test]
    fn new_order_starts_in_new_state_with_zero_fill() {
        let intent = sample_intent();
        let order = Order::new(UserId::from("u1"), BrokerKind::XtsPro, &intent, Utc::now());
        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(order.filled_qty, Decimal::ZERO);
        assert_eq!(order.remaining_qty(), dec!(10));
        assert!(!order.is_terminal());
    }

    #[test]
    fn broker_kind_is_fixed_at_creation() {
        let intent = sample_intent();
        let order = Order::new(UserId::from("u1"), BrokerKind::Zerodha, &intent, Utc::now());
        assert_eq!(order.broker_kind, BrokerKind::Zerodha);
    }
}
