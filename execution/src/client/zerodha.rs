//! Zerodha (Kite Connect) adapter. Login is two-step: the caller obtains a
//! `request_token` out of band via the broker's login redirect, then exchanges it plus
//! the API secret (HMAC-SHA256 checksum) for a session token (spec §4.3, §4.7). There
//! is no refresh endpoint - an expired session requires the full two-step flow again.

use super::{
    BrokerClient, BrokerStreamHandle, LoginCredentials, OrderFilter, PositionSnapshot, Quote, SessionToken, StreamSpec,
};
use crate::codec::zerodha::{self, modify_is_native, ExchangeSegmentWire, CAPABILITIES};
use crate::codec::{validate_intent, Capabilities};
use crate::error::GatewayErrorKind;
use crate::order::{BrokerAck, BrokerOrderId, ExecutionReport, ModifyIntent, OrderIntent};
use crate::streaming::Channel;
use crate::transport::HttpTransport;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use gateway_markets::{BrokerKind, OrderStatus, Symbol};
use hmac::{Hmac, Mac};
use reqwest::Method;
use rust_decimal::Decimal;
use serde_json::json;
use sha2::Sha256;
use std::collections::HashMap;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug)]
pub struct ZerodhaClient {
    transport: HttpTransport,
    default_deadline: Duration,
}

impl ZerodhaClient {
    pub fn new(transport: HttpTransport) -> Self {
        Self {
            transport,
            default_deadline: Duration::from_secs(5),
        }
    }

    fn exchange_segment_wire(&self, intent: &OrderIntent) -> Result<&'static str, GatewayErrorKind> {
        let wire = ExchangeSegmentWire::try_from(&intent.exchange_segment)
            .map_err(|_| GatewayErrorKind::validation("exchange segment not representable on Zerodha"))?;
        zerodha::EXCHANGE_SEGMENT.encode(wire)
    }
}

#[async_trait]
impl BrokerClient for ZerodhaClient {
    fn kind(&self) -> BrokerKind {
        BrokerKind::Zerodha
    }

    fn capabilities(&self) -> Capabilities {
        CAPABILITIES
    }

    async fn login(&self, credentials: &LoginCredentials) -> Result<SessionToken, GatewayErrorKind> {
        let request_token = credentials
            .request_token
            .as_ref()
            .ok_or_else(|| GatewayErrorKind::auth("Zerodha login requires a request_token from the login redirect"))?;

        let mut mac = HmacSha256::new_from_slice(credentials.api_secret.as_bytes())
            .map_err(|e| GatewayErrorKind::internal(format!("invalid HMAC key material: {e}")))?;
        mac.update(credentials.api_key.as_bytes());
        mac.update(request_token.as_bytes());
        let checksum = hex::encode(mac.finalize().into_bytes());

        let body = json!({
            "api_key": credentials.api_key,
            "request_token": request_token,
            "checksum": checksum,
        });
        let response: serde_json::Value = self
            .transport
            .request_json(Method::POST, "/session/token", Some(body), &[], self.default_deadline)
            .await?;
        let access_token = response["data"]["access_token"]
            .as_str()
            .ok_or_else(|| GatewayErrorKind::internal("login response missing access_token"))?
            .to_string();

        Ok(SessionToken {
            broker_kind: BrokerKind::Zerodha,
            auth_header: format!("token {}:{}", credentials.api_key, access_token),
            refresh_token: None,
            // Kite access tokens are valid until the next trading day's invalidation;
            // modelled as a conservative same-day window.
            expires_at: Utc::now() + ChronoDuration::hours(8),
        })
    }

    async fn refresh(&self, session: &SessionToken) -> Result<SessionToken, GatewayErrorKind> {
        Err(GatewayErrorKind::state(format!(
            "{:?} has no refresh endpoint; relogin via the two-step flow is required",
            session.broker_kind
        )))
    }

    async fn logout(&self, session: &SessionToken) -> Result<(), GatewayErrorKind> {
        let headers = [("Authorization", session.auth_header.clone())];
        let _: serde_json::Value = self
            .transport
            .request_json(Method::DELETE, "/session/token", None, &headers, self.default_deadline)
            .await?;
        Ok(())
    }

    async fn place_order(&self, session: &SessionToken, intent: &OrderIntent) -> Result<BrokerAck, GatewayErrorKind> {
        validate_intent(intent, &CAPABILITIES)?;
        let body = json!({
            "exchange": self.exchange_segment_wire(intent)?,
            "tradingsymbol": intent.symbol.as_ref(),
            "transaction_type": zerodha::SIDE.encode(intent.side)?,
            "order_type": zerodha::ORDER_TYPE.encode(intent.order_type)?,
            "validity": zerodha::TIME_IN_FORCE.encode(intent.tif)?,
            "product": zerodha::PRODUCT_TYPE.encode(intent.product_type)?,
            "quantity": intent.qty,
            "price": intent.price,
            "trigger_price": intent.stop_price,
        });
        let headers = [("Authorization", session.auth_header.clone())];
        let response: serde_json::Value = self
            .transport
            .request_json(Method::POST, "/orders/regular", Some(body), &headers, self.default_deadline)
            .await?;
        let broker_order_id = response["data"]["order_id"]
            .as_str()
            .ok_or_else(|| GatewayErrorKind::internal("place order response missing order_id"))?;

        Ok(BrokerAck {
            broker_order_id: BrokerOrderId::from(broker_order_id),
            accepted_status: OrderStatus::Open,
        })
    }

    /// Emulates modification via cancel+replace when [`modify_is_native`] says the
    /// requested change isn't a pure price update (spec §4.7).
    async fn modify_order(&self, session: &SessionToken, modify: &ModifyIntent) -> Result<BrokerAck, GatewayErrorKind> {
        if !modify_is_native(modify.new_qty, modify.new_price) {
            return Err(GatewayErrorKind::state(
                "this modification is not natively supported by Zerodha; the Router must cancel and replace",
            ));
        }
        let path = format!("/orders/regular/{}", modify.order_id.0);
        let body = json!({ "price": modify.new_price });
        let headers = [("Authorization", session.auth_header.clone())];
        let _: serde_json::Value = self
            .transport
            .request_json(Method::PUT, &path, Some(body), &headers, self.default_deadline)
            .await?;
        Ok(BrokerAck {
            broker_order_id: BrokerOrderId::from(modify.order_id.0.to_string().as_str()),
            accepted_status: OrderStatus::Open,
        })
    }

    async fn cancel_order(
        &self,
        session: &SessionToken,
        broker_order_id: &BrokerOrderId,
    ) -> Result<(), GatewayErrorKind> {
        let path = format!("/orders/regular/{}", broker_order_id);
        let headers = [("Authorization", session.auth_header.clone())];
        let _: serde_json::Value = self
            .transport
            .request_json(Method::DELETE, &path, None, &headers, self.default_deadline)
            .await?;
        Ok(())
    }

    async fn get_order_status(
        &self,
        session: &SessionToken,
        broker_order_id: &BrokerOrderId,
    ) -> Result<ExecutionReport, GatewayErrorKind> {
        let path = format!("/orders/{}", broker_order_id);
        let headers = [("Authorization", session.auth_header.clone())];
        let response: serde_json::Value = self
            .transport
            .request_json(Method::GET, &path, None, &headers, self.default_deadline)
            .await?;
        parse_order_history(&response, broker_order_id.clone())
    }

    async fn get_orders(
        &self,
        session: &SessionToken,
        filter: &OrderFilter,
    ) -> Result<Vec<ExecutionReport>, GatewayErrorKind> {
        let headers = [("Authorization", session.auth_header.clone())];
        let response: serde_json::Value = self
            .transport
            .request_json(Method::GET, "/orders", None, &headers, self.default_deadline)
            .await?;
        let rows = response["data"].as_array().cloned().unwrap_or_default();
        rows.iter()
            .filter(|row| {
                filter
                    .symbol
                    .as_ref()
                    .map_or(true, |symbol| row["tradingsymbol"].as_str() == Some(symbol.0.as_str()))
            })
            .map(|row| {
                let order_id = row["order_id"]
                    .as_str()
                    .ok_or_else(|| GatewayErrorKind::internal("order row missing order_id"))?;
                parse_order_row(row, BrokerOrderId::from(order_id))
            })
            .filter(|report| match report {
                Ok(report) => filter.status.map_or(true, |wanted| wanted == report.status),
                Err(_) => true,
            })
            .collect()
    }

    async fn get_positions(&self, session: &SessionToken) -> Result<Vec<PositionSnapshot>, GatewayErrorKind> {
        let headers = [("Authorization", session.auth_header.clone())];
        let response: serde_json::Value = self
            .transport
            .request_json(Method::GET, "/portfolio/positions", None, &headers, self.default_deadline)
            .await?;
        let rows = response["data"]["net"].as_array().cloned().unwrap_or_default();
        rows.iter().map(parse_position_row).collect()
    }

    async fn get_quote(
        &self,
        session: &SessionToken,
        symbols: &[Symbol],
    ) -> Result<HashMap<Symbol, Quote>, GatewayErrorKind> {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        for symbol in symbols {
            query.append_pair("i", symbol.0.as_str());
        }
        let path = format!("/quote?{}", query.finish());
        let headers = [("Authorization", session.auth_header.clone())];
        let response: serde_json::Value = self
            .transport
            .request_json(Method::GET, &path, None, &headers, self.default_deadline)
            .await?;
        let now = Utc::now();
        let mut quotes = HashMap::new();
        if let Some(data) = response["data"].as_object() {
            for (key, row) in data {
                let last_price = row["last_price"].as_f64().and_then(Decimal::from_f64_retain).unwrap_or(Decimal::ZERO);
                let symbol = key.split(':').next_back().unwrap_or(key);
                quotes.insert(Symbol::from(symbol), Quote { last_price, timestamp: now });
            }
        }
        Ok(quotes)
    }

    /// Kite's streaming ticker is a raw WebSocket the caller connects to directly;
    /// `openStream` here only mints the API-key-scoped handle that authenticates that
    /// connection, since there is no separate REST session to open (spec §4.7).
    async fn open_stream(
        &self,
        session: &SessionToken,
        _spec: &StreamSpec,
    ) -> Result<BrokerStreamHandle, GatewayErrorKind> {
        Ok(BrokerStreamHandle(session.auth_header.clone()))
    }

    /// Kite ticker subscribe/unsubscribe are control frames sent over the ticker
    /// WebSocket itself, not REST calls; there is nothing for this HTTP-only adapter
    /// to do beyond confirming the handle is still open (spec §4.7).
    async fn subscribe(&self, handle: &BrokerStreamHandle, _channel: Channel, _symbols: &[Symbol]) -> Result<(), GatewayErrorKind> {
        ensure_stream_open(handle)
    }

    async fn unsubscribe(&self, handle: &BrokerStreamHandle, _channel: Channel, _symbols: &[Symbol]) -> Result<(), GatewayErrorKind> {
        ensure_stream_open(handle)
    }

    async fn close_stream(&self, handle: &BrokerStreamHandle) -> Result<(), GatewayErrorKind> {
        ensure_stream_open(handle)
    }
}

fn ensure_stream_open(handle: &BrokerStreamHandle) -> Result<(), GatewayErrorKind> {
    if handle.0.is_empty() {
        return Err(GatewayErrorKind::state("stream handle is not open"));
    }
    Ok(())
}

fn parse_order_history(
    response: &serde_json::Value,
    broker_order_id: BrokerOrderId,
) -> Result<ExecutionReport, GatewayErrorKind> {
    let latest = response["data"]
        .as_array()
        .and_then(|rows| rows.last())
        .ok_or_else(|| GatewayErrorKind::internal("order history response missing data row"))?;
    parse_order_row(latest, broker_order_id)
}

/// Row-level counterpart of [`parse_order_history`], shared with `get_orders`'s bulk
/// listing (each row there uses the same field names as one order-history entry).
fn parse_order_row(latest: &serde_json::Value, broker_order_id: BrokerOrderId) -> Result<ExecutionReport, GatewayErrorKind> {
    let wire_status = latest["status"]
        .as_str()
        .ok_or_else(|| GatewayErrorKind::internal("order response missing status"))?;
    let status = match wire_status {
        "OPEN PENDING" | "PUT ORDER REQ RECEIVED" => OrderStatus::Pending,
        "OPEN" | "TRIGGER PENDING" => OrderStatus::Open,
        "COMPLETE" => OrderStatus::Filled,
        "CANCELLED" => OrderStatus::Cancelled,
        "REJECTED" => OrderStatus::Rejected,
        other => return Err(GatewayErrorKind::validation(format!("unrecognised Zerodha order status: {other}"))),
    };

    let filled_qty = latest["filled_quantity"]
        .as_u64()
        .map(rust_decimal::Decimal::from)
        .unwrap_or(rust_decimal::Decimal::ZERO);
    let status = if status == OrderStatus::Open && filled_qty > rust_decimal::Decimal::ZERO {
        OrderStatus::PartiallyFilled
    } else {
        status
    };
    let avg_price = latest["average_price"].as_f64().and_then(rust_decimal::Decimal::from_f64_retain);
    let timestamp = Utc::now();

    Ok(ExecutionReport {
        broker_order_id,
        seq: timestamp.timestamp_millis().max(0) as u64,
        status,
        filled_qty,
        avg_price,
        last_fill_qty: rust_decimal::Decimal::ZERO,
        last_fill_price: None,
        rejection_reason: latest["status_message"].as_str().map(str::to_string),
        timestamp,
    })
}

/// Maps one row of Kite's `GET /portfolio/positions` `net` array onto
/// [`PositionSnapshot`].
fn parse_position_row(row: &serde_json::Value) -> Result<PositionSnapshot, GatewayErrorKind> {
    let symbol = row["tradingsymbol"]
        .as_str()
        .ok_or_else(|| GatewayErrorKind::internal("position row missing tradingsymbol"))?;
    let wire_segment = row["exchange"]
        .as_str()
        .ok_or_else(|| GatewayErrorKind::internal("position row missing exchange"))?;
    let exchange_segment: gateway_markets::ExchangeSegment = zerodha::EXCHANGE_SEGMENT.decode(wire_segment)?.into();
    let wire_product = row["product"]
        .as_str()
        .ok_or_else(|| GatewayErrorKind::internal("position row missing product"))?;
    let product_type = zerodha::PRODUCT_TYPE.decode(wire_product)?;

    let net_qty = row["quantity"].as_i64().map(Decimal::from).unwrap_or(Decimal::ZERO);
    let avg_price = row["average_price"].as_f64().and_then(Decimal::from_f64_retain).unwrap_or(Decimal::ZERO);
    let realized_pnl = row["realised"].as_f64().and_then(Decimal::from_f64_retain).unwrap_or(Decimal::ZERO);

    Ok(PositionSnapshot {
        symbol: Symbol::from(symbol),
        exchange_segment,
        product_type,
        net_qty,
        avg_price,
        realized_pnl,
    })
}
