//! # BrokerClient
//!
//! The single abstraction every adapter (XTS PRO, XTS Client, Zerodha) implements
//! (spec §4.1). The Router, Session Manager and Streaming Hub only ever see a
//! `dyn BrokerClient` plus its [`Capabilities`](crate::codec::Capabilities) - no
//! broker-specific branching lives above this layer.

pub mod mock;
pub mod xts;
pub mod zerodha;

use crate::codec::Capabilities;
use crate::error::GatewayErrorKind;
use crate::order::{BrokerAck, BrokerOrderId, ExecutionReport, ModifyIntent, OrderIntent};
use crate::streaming::Channel;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gateway_markets::{BrokerKind, ExchangeSegment, OrderStatus, ProductType, Symbol};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;

/// Credentials presented at login. Fields are a superset over the three adapters;
/// each adapter validates that the fields it needs are present and ignores the rest
/// (spec §4.3: XTS uses apiKey/secret, XTS Client additionally needs a dealer
/// `clientId`, Zerodha's first leg needs apiKey/secret and its second leg a
/// `requestToken` obtained out of band from the login redirect).
#[derive(Clone)]
pub struct LoginCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub dealer_client_id: Option<String>,
    pub request_token: Option<String>,
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .field("dealer_client_id", &self.dealer_client_id)
            .field("request_token", &self.request_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// An opaque, broker-scoped authenticated session (spec §4.3). The Session Manager is
/// the sole owner of these; adapters only consume the header value they embed.
#[derive(Clone)]
pub struct SessionToken {
    pub broker_kind: BrokerKind,
    pub auth_header: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("broker_kind", &self.broker_kind)
            .field("auth_header", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl SessionToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Filter for `getOrders` (spec §4.1/§4.8: "filter supports status, symbol, time
/// range, pagination `{limit, cursor}`"). Every field is optional; an adapter that
/// can't express a given combination natively is free to over-fetch and the Router
/// never relies on the broker itself narrowing beyond what it reports.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub symbol: Option<Symbol>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub cursor: Option<String>,
}

/// A broker-reported position row (spec §4.1 `getPositions`). Distinct from
/// [`crate::position::Position`]: this is the broker's own point-in-time view, used to
/// seed or cross-check the Position Tracker's derived state, not the tracker's record
/// itself (the tracker is the sole writer of that, spec §4.5/I5).
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSnapshot {
    pub symbol: Symbol,
    pub exchange_segment: ExchangeSegment,
    pub product_type: ProductType,
    pub net_qty: Decimal,
    pub avg_price: Decimal,
    pub realized_pnl: Decimal,
}

/// A last-traded-price snapshot (spec §4.1 `getQuote`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub last_price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Parameters for `openStream` (spec §4.1). Channels/symbols given here are the
/// initial subscription set; further channels are added via `subscribe`.
#[derive(Debug, Clone, Default)]
pub struct StreamSpec {
    pub channels: Vec<(Channel, Option<Symbol>)>,
}

/// Opaque handle to an adapter's upstream streaming session, returned by
/// `openStream` and threaded through `subscribe`/`unsubscribe`/`closeStream`. Distinct
/// from [`crate::streaming::StreamHandle`], which is the Hub's downstream fan-out
/// bookkeeping; this is the broker-side connection the Hub's single reader task feeds
/// from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerStreamHandle(pub String);

/// Implemented once per broker product. Every method maps 1:1 onto a spec §4.1
/// operation; none of them retry or apply idempotency - that's the Router's job
/// (spec §4.4) so every adapter gets the same policy for free.
#[async_trait]
pub trait BrokerClient: Send + Sync + fmt::Debug {
    fn kind(&self) -> BrokerKind;
    fn capabilities(&self) -> Capabilities;

    async fn login(&self, credentials: &LoginCredentials) -> Result<SessionToken, GatewayErrorKind>;
    async fn refresh(&self, session: &SessionToken) -> Result<SessionToken, GatewayErrorKind>;
    async fn logout(&self, session: &SessionToken) -> Result<(), GatewayErrorKind>;

    async fn place_order(&self, session: &SessionToken, intent: &OrderIntent) -> Result<BrokerAck, GatewayErrorKind>;
    async fn modify_order(&self, session: &SessionToken, modify: &ModifyIntent) -> Result<BrokerAck, GatewayErrorKind>;
    async fn cancel_order(
        &self,
        session: &SessionToken,
        broker_order_id: &BrokerOrderId,
    ) -> Result<(), GatewayErrorKind>;
    async fn get_order_status(
        &self,
        session: &SessionToken,
        broker_order_id: &BrokerOrderId,
    ) -> Result<ExecutionReport, GatewayErrorKind>;

    /// spec §4.1/§4.8 `getOrders` — used by bulk reconciliation and order-history
    /// queries, as distinct from `getOrder`'s single-order poll.
    async fn get_orders(
        &self,
        session: &SessionToken,
        filter: &OrderFilter,
    ) -> Result<Vec<ExecutionReport>, GatewayErrorKind>;

    /// spec §4.1 `getPositions`.
    async fn get_positions(&self, session: &SessionToken) -> Result<Vec<PositionSnapshot>, GatewayErrorKind>;

    /// spec §4.1 `getQuote`.
    async fn get_quote(
        &self,
        session: &SessionToken,
        symbols: &[Symbol],
    ) -> Result<HashMap<Symbol, Quote>, GatewayErrorKind>;

    /// spec §4.1 `openStream` — establishes the upstream streaming session the Hub's
    /// reader task then drives.
    async fn open_stream(
        &self,
        session: &SessionToken,
        spec: &StreamSpec,
    ) -> Result<BrokerStreamHandle, GatewayErrorKind>;

    /// spec §4.1/§4.6 `subscribe` — issued only on a Hub subscription's 0->1
    /// transition (invariant I6); the Router/Hub, not the adapter, own refcounting.
    async fn subscribe(
        &self,
        handle: &BrokerStreamHandle,
        channel: Channel,
        symbols: &[Symbol],
    ) -> Result<(), GatewayErrorKind>;

    /// spec §4.1/§4.6 `unsubscribe` — issued only on a 1->0 transition.
    async fn unsubscribe(
        &self,
        handle: &BrokerStreamHandle,
        channel: Channel,
        symbols: &[Symbol],
    ) -> Result<(), GatewayErrorKind>;

    /// spec §4.1 `closeStream`.
    async fn close_stream(&self, handle: &BrokerStreamHandle) -> Result<(), GatewayErrorKind>;
}
