//! `ExecutionReport` and the pure fill-application logic the Order Engine uses to
//! converge an [`Order`](super::Order) onto it (spec §4.4, invariants I1-I3, I8/P8).

use super::{BrokerOrderId, Order};
use chrono::{DateTime, Utc};
use gateway_markets::OrderStatus;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Produced by an adapter from the upstream stream or a reconciliation poll, and
/// consumed exactly once by the Order Engine and Position Tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub broker_order_id: BrokerOrderId,
    /// Monotonically non-decreasing per `broker_order_id`. Adapters synthesise one
    /// from the timestamp when the upstream protocol doesn't provide a sequence.
    pub seq: u64,
    pub status: OrderStatus,
    pub filled_qty: Decimal,
    pub avg_price: Option<Decimal>,
    pub last_fill_qty: Decimal,
    pub last_fill_price: Option<Decimal>,
    pub rejection_reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of attempting to apply a report to an order, used by the engine to decide
/// whether to emit a `POSITION_UPDATE`-triggering fill event.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// The report was stale (sequence <= last applied) or the order was already
    /// terminal; discarded per invariant I3/P8. No mutation occurred.
    Discarded,
    /// Applied. Carries the fill just recorded, if the report represented one
    /// (`last_fill_qty > 0`), for the Position Tracker to consume.
    Applied { fill: Option<Fill> },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    pub qty: Decimal,
    pub price: Decimal,
}

/// Applies `report` to `order` in place, honouring:
/// - I3: a terminal status is never overwritten.
/// - I1/I2: `filled_qty` is the running sum of applied `last_fill_qty`, and
///   `avg_fill_price` is volume-weighted over applied fills.
/// - P8: applying the same report twice (same or lower `seq`) is a no-op.
pub fn apply_report(order: &mut Order, report: &ExecutionReport, now: DateTime<Utc>) -> ApplyOutcome {
    if order.is_terminal() {
        tracing::warn!(
            order_id = %order.order_id,
            seq = report.seq,
            "discarding execution report for terminal order"
        );
        return ApplyOutcome::Discarded;
    }

    if report.seq <= order.last_applied_seq {
        tracing::warn!(
            order_id = %order.order_id,
            seq = report.seq,
            last_applied = order.last_applied_seq,
            "discarding stale/duplicate execution report"
        );
        return ApplyOutcome::Discarded;
    }

    let mut fill = None;
    if report.last_fill_qty > Decimal::ZERO {
        if let Some(last_fill_price) = report.last_fill_price {
            let prior_value = order.avg_fill_price.unwrap_or(Decimal::ZERO) * order.filled_qty;
            let new_filled = order.filled_qty + report.last_fill_qty;
            let new_value = prior_value + last_fill_price * report.last_fill_qty;
            order.avg_fill_price = if new_filled > Decimal::ZERO {
                Some(new_value / new_filled)
            } else {
                None
            };
            order.filled_qty = new_filled;
            fill = Some(Fill {
                qty: report.last_fill_qty,
                price: last_fill_price,
            });
        }
    }

    order.status = report.status;
    order.last_applied_seq = report.seq;
    order.updated_at = now;

    ApplyOutcome::Applied { fill }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::OrderIntent;
    use gateway_markets::{ExchangeSegment, OrderType, ProductType, Side, TimeInForce, UserId};
    use gateway_markets::BrokerKind;
    use rust_decimal_macros::dec;

    fn new_order() -> Order {
        let intent = OrderIntent {
            client_order_id: Some("c1".into()),
            symbol: "AAPL".into(),
            exchange_segment: ExchangeSegment::NseEq,
            side: Side::Buy,
            order_type: OrderType::Limit,
            qty: dec!(10),
            price: Some(dec!(175.50)),
            stop_price: None,
            product_type: ProductType::Delivery,
            tif: TimeInForce::Gtc,
        };
        let mut order = Order::new(UserId::from("u1"), BrokerKind::XtsPro, &intent, Utc::now());
        order.status = OrderStatus::Open;
        order.broker_order_id = Some("B1".into());
        order
    }

    fn report(seq: u64, last_fill_qty: Decimal, last_fill_price: Decimal, status: OrderStatus) -> ExecutionReport {
        ExecutionReport {
            broker_order_id: "B1".into(),
            seq,
            status,
            filled_qty: Decimal::ZERO, // recomputed by apply_report from the order, not trusted from upstream here
            avg_price: None,
            last_fill_qty,
            last_fill_price: Some(last_fill_price),
            rejection_reason: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn happy_path_limit_fill_matches_spec_scenario_1() {
        let mut order = new_order();
        let now = Utc::now();

        let r1 = report(1, dec!(4), dec!(175.48), OrderStatus::PartiallyFilled);
        let outcome = apply_report(&mut order, &r1, now);
        assert!(matches!(outcome, ApplyOutcome::Applied { fill: Some(_) }));
        assert_eq!(order.filled_qty, dec!(4));

        let r2 = report(2, dec!(6), dec!(175.50), OrderStatus::Filled);
        apply_report(&mut order, &r2, now);

        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.filled_qty, dec!(10));
        let expected_avg = (dec!(4) * dec!(175.48) + dec!(6) * dec!(175.50)) / dec!(10);
        assert_eq!(order.avg_fill_price, Some(expected_avg));
    }

    #[test]
    fn terminal_order_never_accepts_another_report_i3() {
        let mut order = new_order();
        let now = Utc::now();
        apply_report(&mut order, &report(1, dec!(10), dec!(175.50), OrderStatus::Filled), now);
        assert_eq!(order.status, OrderStatus::Filled);

        let outcome = apply_report(&mut order, &report(2, dec!(1), dec!(999), OrderStatus::Filled), now);
        assert_eq!(outcome, ApplyOutcome::Discarded);
        assert_eq!(order.filled_qty, dec!(10)); // unchanged
    }

    #[test]
    fn duplicate_report_is_a_no_op_p8() {
        let mut order = new_order();
        let now = Utc::now();
        let r = report(1, dec!(4), dec!(175.48), OrderStatus::PartiallyFilled);
        apply_report(&mut order, &r, now);
        let before = order.clone();

        let outcome = apply_report(&mut order, &r, now);
        assert_eq!(outcome, ApplyOutcome::Discarded);
        assert_eq!(order, before);
    }

    #[test]
    fn partial_fill_then_cancel_matches_spec_scenario_4() {
        let mut order = new_order();
        let now = Utc::now();
        apply_report(&mut order, &report(1, dec!(3), dec!(175.50), OrderStatus::PartiallyFilled), now);

        let cancel = ExecutionReport {
            broker_order_id: "B1".into(),
            seq: 2,
            status: OrderStatus::Cancelled,
            filled_qty: dec!(3),
            avg_price: Some(dec!(175.50)),
            last_fill_qty: Decimal::ZERO,
            last_fill_price: None,
            rejection_reason: None,
            timestamp: now,
        };
        apply_report(&mut order, &cancel, now);

        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.filled_qty, dec!(3));
    }
}
