//! XTS PRO / XTS Client adapter. Both products speak the same Interactive Order API;
//! [`XtsVariant`](crate::codec::xts::XtsVariant) selects the dealer-on-behalf
//! `clientId` behaviour and which base URL/credentials apply (spec §4.7).

use super::{
    BrokerClient, BrokerStreamHandle, LoginCredentials, OrderFilter, PositionSnapshot, Quote, SessionToken, StreamSpec,
};
use crate::codec::xts::{self, ExchangeSegmentWire, XtsVariant};
use crate::codec::{validate_intent, Capabilities};
use crate::error::GatewayErrorKind;
use crate::order::{BrokerAck, BrokerOrderId, ExecutionReport, ModifyIntent, OrderIntent};
use crate::streaming::Channel;
use crate::transport::HttpTransport;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use gateway_markets::{BrokerKind, OrderStatus, Symbol};
use reqwest::Method;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug)]
pub struct XtsClient {
    variant: XtsVariant,
    transport: HttpTransport,
    dealer_client_id: Option<String>,
    default_deadline: Duration,
}

impl XtsClient {
    pub fn new(variant: XtsVariant, transport: HttpTransport, dealer_client_id: Option<String>) -> Self {
        Self {
            variant,
            transport,
            dealer_client_id,
            default_deadline: Duration::from_secs(5),
        }
    }

    fn broker_kind(&self) -> BrokerKind {
        match self.variant {
            XtsVariant::Pro => BrokerKind::XtsPro,
            XtsVariant::Client => BrokerKind::XtsClient,
        }
    }

    fn exchange_segment_wire(&self, intent: &OrderIntent) -> Result<&'static str, GatewayErrorKind> {
        let wire = ExchangeSegmentWire::try_from(&intent.exchange_segment)
            .map_err(|_| GatewayErrorKind::validation("exchange segment not representable on XTS"))?;
        xts::EXCHANGE_SEGMENT.encode(wire)
    }
}

#[async_trait]
impl BrokerClient for XtsClient {
    fn kind(&self) -> BrokerKind {
        self.broker_kind()
    }

    fn capabilities(&self) -> Capabilities {
        self.variant.capabilities()
    }

    async fn login(&self, credentials: &LoginCredentials) -> Result<SessionToken, GatewayErrorKind> {
        let body = json!({
            "appKey": credentials.api_key,
            "secretKey": credentials.api_secret,
            "source": "WEBAPI",
        });
        let response: serde_json::Value = self
            .transport
            .request_json(Method::POST, "/interactive/user/session", Some(body), &[], self.default_deadline)
            .await?;
        let token = response["result"]["token"]
            .as_str()
            .ok_or_else(|| GatewayErrorKind::internal("login response missing token"))?
            .to_string();

        Ok(SessionToken {
            broker_kind: self.broker_kind(),
            auth_header: token,
            refresh_token: None,
            // XTS session tokens are day-scoped; Session Manager re-logs in near expiry
            // rather than refreshing, since the product has no refresh endpoint.
            expires_at: Utc::now() + ChronoDuration::hours(12),
        })
    }

    async fn refresh(&self, session: &SessionToken) -> Result<SessionToken, GatewayErrorKind> {
        Err(GatewayErrorKind::state(format!(
            "{:?} has no refresh endpoint; relogin required",
            session.broker_kind
        )))
    }

    async fn logout(&self, session: &SessionToken) -> Result<(), GatewayErrorKind> {
        let headers = [("Authorization", session.auth_header.clone())];
        let _: serde_json::Value = self
            .transport
            .request_json(Method::DELETE, "/interactive/user/session", None, &headers, self.default_deadline)
            .await?;
        Ok(())
    }

    async fn place_order(&self, session: &SessionToken, intent: &OrderIntent) -> Result<BrokerAck, GatewayErrorKind> {
        validate_intent(intent, &self.capabilities())?;
        let segment = self.exchange_segment_wire(intent)?;
        let mut body = json!({
            "exchangeSegment": segment,
            "orderSide": xts::SIDE.encode(intent.side)?,
            "orderType": xts::ORDER_TYPE.encode(intent.order_type)?,
            "timeInForce": xts::TIME_IN_FORCE.encode(intent.tif)?,
            "productType": xts::PRODUCT_TYPE.encode(intent.product_type)?,
            "orderQuantity": intent.qty,
            "limitPrice": intent.price,
            "stopPrice": intent.stop_price,
            "tradingSymbol": intent.symbol.as_ref(),
        });
        if let Some(dealer_client_id) = &self.dealer_client_id {
            body["clientID"] = json!(dealer_client_id);
        }
        let headers = [("Authorization", session.auth_header.clone())];
        let response: serde_json::Value = self
            .transport
            .request_json(Method::POST, "/interactive/orders", Some(body), &headers, self.default_deadline)
            .await?;
        let app_order_id = &response["result"]["AppOrderID"];
        let broker_order_id = app_order_id
            .as_str()
            .map(str::to_string)
            .or_else(|| app_order_id.as_u64().map(|id| id.to_string()))
            .ok_or_else(|| GatewayErrorKind::internal("place order response missing AppOrderID"))?;

        Ok(BrokerAck {
            broker_order_id: BrokerOrderId::from(broker_order_id.as_str()),
            accepted_status: OrderStatus::Open,
        })
    }

    async fn modify_order(&self, session: &SessionToken, modify: &ModifyIntent) -> Result<BrokerAck, GatewayErrorKind> {
        let body = json!({
            "appOrderID": modify.order_id.0.to_string(),
            "modifiedOrderQuantity": modify.new_qty,
            "modifiedLimitPrice": modify.new_price,
        });
        let headers = [("Authorization", session.auth_header.clone())];
        let _: serde_json::Value = self
            .transport
            .request_json(Method::PUT, "/interactive/orders", Some(body), &headers, self.default_deadline)
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
        let path = format!("/interactive/orders?appOrderID={}", broker_order_id);
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
        let path = format!("/interactive/orders?appOrderID={}", broker_order_id);
        let headers = [("Authorization", session.auth_header.clone())];
        let response: serde_json::Value = self
            .transport
            .request_json(Method::GET, &path, None, &headers, self.default_deadline)
            .await?;
        parse_order_status(&response, broker_order_id.clone())
    }

    async fn get_orders(
        &self,
        session: &SessionToken,
        filter: &OrderFilter,
    ) -> Result<Vec<ExecutionReport>, GatewayErrorKind> {
        let headers = [("Authorization", session.auth_header.clone())];
        let response: serde_json::Value = self
            .transport
            .request_json(Method::GET, "/interactive/orders", None, &headers, self.default_deadline)
            .await?;
        let rows = response["result"].as_array().cloned().unwrap_or_default();
        rows.iter()
            .filter(|row| {
                filter
                    .symbol
                    .as_ref()
                    .map_or(true, |symbol| row["TradingSymbol"].as_str() == Some(symbol.0.as_str()))
            })
            .map(|row| {
                let app_order_id = row["AppOrderID"]
                    .as_str()
                    .map(str::to_string)
                    .or_else(|| row["AppOrderID"].as_u64().map(|id| id.to_string()))
                    .ok_or_else(|| GatewayErrorKind::internal("order row missing AppOrderID"))?;
                parse_order_status_row(row, BrokerOrderId::from(app_order_id.as_str()))
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
            .request_json(
                Method::GET,
                "/interactive/portfolio/positions?dayOrNet=NetWise",
                None,
                &headers,
                self.default_deadline,
            )
            .await?;
        let rows = response["result"]["positionList"].as_array().cloned().unwrap_or_default();
        rows.iter().map(parse_position_row).collect()
    }

    async fn get_quote(
        &self,
        session: &SessionToken,
        symbols: &[Symbol],
    ) -> Result<HashMap<Symbol, Quote>, GatewayErrorKind> {
        let instruments: Vec<&str> = symbols.iter().map(|s| s.0.as_str()).collect();
        let body = json!({ "instruments": instruments, "xtsMessageCode": 1512, "publishFormat": "JSON" });
        let headers = [("Authorization", session.auth_header.clone())];
        let response: serde_json::Value = self
            .transport
            .request_json(Method::POST, "/marketdata/instruments/quotes", Some(body), &headers, self.default_deadline)
            .await?;
        let rows = response["result"]["listQuotes"].as_array().cloned().unwrap_or_default();
        let now = Utc::now();
        let mut quotes = HashMap::new();
        for (symbol, row) in symbols.iter().zip(rows.iter()) {
            let last_price = row["Touchline"]["LastTradedPrice"]
                .as_f64()
                .and_then(Decimal::from_f64_retain)
                .unwrap_or(Decimal::ZERO);
            quotes.insert(symbol.clone(), Quote { last_price, timestamp: now });
        }
        Ok(quotes)
    }

    async fn open_stream(
        &self,
        session: &SessionToken,
        _spec: &StreamSpec,
    ) -> Result<BrokerStreamHandle, GatewayErrorKind> {
        let headers = [("Authorization", session.auth_header.clone())];
        let response: serde_json::Value = self
            .transport
            .request_json(Method::GET, "/marketdata/auth/login", None, &headers, self.default_deadline)
            .await?;
        let token = response["result"]["token"]
            .as_str()
            .ok_or_else(|| GatewayErrorKind::internal("marketdata login response missing token"))?;
        Ok(BrokerStreamHandle(token.to_string()))
    }

    async fn subscribe(
        &self,
        handle: &BrokerStreamHandle,
        channel: Channel,
        symbols: &[Symbol],
    ) -> Result<(), GatewayErrorKind> {
        self.change_subscription(handle, channel, symbols, Method::POST).await
    }

    async fn unsubscribe(
        &self,
        handle: &BrokerStreamHandle,
        channel: Channel,
        symbols: &[Symbol],
    ) -> Result<(), GatewayErrorKind> {
        self.change_subscription(handle, channel, symbols, Method::PUT).await
    }

    async fn close_stream(&self, handle: &BrokerStreamHandle) -> Result<(), GatewayErrorKind> {
        let headers = [("Authorization", handle.0.clone())];
        let _: serde_json::Value = self
            .transport
            .request_json(Method::DELETE, "/marketdata/auth/logout", None, &headers, self.default_deadline)
            .await?;
        Ok(())
    }
}

impl XtsClient {
    /// XTS marketdata subscribe/unsubscribe share one request shape, differing only in
    /// HTTP method (`POST` to add, `PUT` to remove - per the XTS Interactive API).
    async fn change_subscription(
        &self,
        handle: &BrokerStreamHandle,
        channel: Channel,
        symbols: &[Symbol],
        method: Method,
    ) -> Result<(), GatewayErrorKind> {
        let instruments: Vec<&str> = symbols.iter().map(|s| s.0.as_str()).collect();
        let body = json!({
            "instruments": instruments,
            "xtsMessageCode": xts_message_code(channel),
        });
        let headers = [("Authorization", handle.0.clone())];
        let _: serde_json::Value = self
            .transport
            .request_json(method, "/marketdata/instruments/subscription", Some(body), &headers, self.default_deadline)
            .await?;
        Ok(())
    }
}

/// XTS message codes identifying the market-data feed type (spec §4.6 channel ->
/// upstream subscription mapping).
fn xts_message_code(channel: Channel) -> u32 {
    match channel {
        Channel::Quote => 1512,
        Channel::OrderUpdate | Channel::PositionUpdate => 1105,
    }
}

/// Maps an XTS `GET /interactive/orders` response onto the canonical
/// [`ExecutionReport`], synthesising a sequence number from the upstream timestamp
/// since the polling endpoint carries no sequence of its own.
fn parse_order_status(
    response: &serde_json::Value,
    broker_order_id: BrokerOrderId,
) -> Result<ExecutionReport, GatewayErrorKind> {
    let result = response["result"]
        .as_array()
        .and_then(|rows| rows.first())
        .ok_or_else(|| GatewayErrorKind::internal("order status response missing result row"))?;
    parse_order_status_row(result, broker_order_id)
}

/// Row-level counterpart of [`parse_order_status`], shared with `get_orders`'s bulk
/// listing which has more than one row to parse per response.
fn parse_order_status_row(
    result: &serde_json::Value,
    broker_order_id: BrokerOrderId,
) -> Result<ExecutionReport, GatewayErrorKind> {
    let wire_status = result["OrderStatus"]
        .as_str()
        .ok_or_else(|| GatewayErrorKind::internal("order status response missing OrderStatus"))?;
    let status = match wire_status {
        "New" | "PendingNew" => OrderStatus::Pending,
        "Open" => OrderStatus::Open,
        "PartiallyFilled" => OrderStatus::PartiallyFilled,
        "Filled" => OrderStatus::Filled,
        "Cancelled" => OrderStatus::Cancelled,
        "Rejected" => OrderStatus::Rejected,
        other => return Err(GatewayErrorKind::validation(format!("unrecognised XTS order status: {other}"))),
    };

    let filled_qty = result["CumulativeQuantity"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .unwrap_or(rust_decimal::Decimal::ZERO);
    let avg_price = result["AverageTradedPrice"].as_str().and_then(|s| s.parse().ok());
    let timestamp = Utc::now();

    Ok(ExecutionReport {
        broker_order_id,
        seq: timestamp.timestamp_millis().max(0) as u64,
        status,
        filled_qty,
        avg_price,
        last_fill_qty: rust_decimal::Decimal::ZERO,
        last_fill_price: None,
        rejection_reason: result["CancelRejectReason"].as_str().map(str::to_string),
        timestamp,
    })
}

/// Maps one row of XTS's `GET /interactive/portfolio/positions` response onto
/// [`PositionSnapshot`].
fn parse_position_row(row: &serde_json::Value) -> Result<PositionSnapshot, GatewayErrorKind> {
    let symbol = row["TradingSymbol"]
        .as_str()
        .ok_or_else(|| GatewayErrorKind::internal("position row missing TradingSymbol"))?;
    let wire_segment = row["ExchangeSegment"]
        .as_str()
        .ok_or_else(|| GatewayErrorKind::internal("position row missing ExchangeSegment"))?;
    let exchange_segment: gateway_markets::ExchangeSegment = xts::EXCHANGE_SEGMENT.decode(wire_segment)?.into();
    let wire_product = row["ProductType"]
        .as_str()
        .ok_or_else(|| GatewayErrorKind::internal("position row missing ProductType"))?;
    let product_type = xts::PRODUCT_TYPE.decode(wire_product)?;

    let net_qty = row["Quantity"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Decimal::ZERO);
    let avg_price = row["AveragePrice"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Decimal::ZERO);
    let realized_pnl = row["RealizedMTM"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Decimal::ZERO);

    Ok(PositionSnapshot {
        symbol: Symbol::from(symbol),
        exchange_segment,
        product_type,
        net_qty,
        avg_price,
        realized_pnl,
    })
}
