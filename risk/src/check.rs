//! Pre-trade gate checks (spec §4.4): thin and narrow by design — deeper risk is an
//! external collaborator. Two concrete checks are named in spec §6: a per-user
//! outstanding-order cap and a per-symbol price sanity band.

use chrono::{DateTime, Utc};
use gateway_markets::{Side, Symbol, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Stable sub-codes a caller (or the Router, mapping into `ValidationError`) can
/// match on, mirroring spec §8 scenario #3's `VALIDATION_ERROR / PRICE_OUT_OF_BAND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskRejectionCode {
    MaxOutstandingOrders,
    PriceOutOfBand,
}

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{code:?}: {reason}")]
pub struct RiskRejection {
    pub code: RiskRejectionCode,
    pub reason: String,
}

/// Everything a check needs to decide on one `submit` call. Built fresh by the Router
/// per call; checks never hold their own mutable state about a specific order.
#[derive(Debug, Clone)]
pub struct RiskContext {
    pub user_id: UserId,
    pub symbol: Symbol,
    pub side: Side,
    pub price: Option<Decimal>,
    pub outstanding_orders_for_user: usize,
    pub last_mark_price: Option<Decimal>,
    pub last_mark_at: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

pub trait RiskCheck: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;
    fn check(&self, ctx: &RiskContext) -> Result<(), RiskRejection>;
}

/// spec §6: `risk.maxOutstandingOrdersPerUser` (default 200).
#[derive(Debug, Clone, Copy)]
pub struct MaxOutstandingOrdersCheck {
    pub max: usize,
}

impl RiskCheck for MaxOutstandingOrdersCheck {
    fn name(&self) -> &'static str {
        "max_outstanding_orders_per_user"
    }

    fn check(&self, ctx: &RiskContext) -> Result<(), RiskRejection> {
        if ctx.outstanding_orders_for_user >= self.max {
            return Err(RiskRejection {
                code: RiskRejectionCode::MaxOutstandingOrders,
                reason: format!(
                    "user {} already has {} outstanding orders (limit {})",
                    ctx.user_id, ctx.outstanding_orders_for_user, self.max
                ),
            });
        }
        Ok(())
    }
}

/// spec §6: `risk.priceBandPercent` (default 20%). Rejects if `price` deviates more
/// than `percent` from the last known mark, but only when that mark is fresh (spec
/// §9 open question: 2 s chosen as the freshness default).
#[derive(Debug, Clone, Copy)]
pub struct PriceBandCheck {
    pub percent: Decimal,
    pub freshness: Duration,
}

impl Default for PriceBandCheck {
    fn default() -> Self {
        Self {
            percent: Decimal::from(20),
            freshness: Duration::from_secs(2),
        }
    }
}

impl RiskCheck for PriceBandCheck {
    fn name(&self) -> &'static str {
        "price_band"
    }

    fn check(&self, ctx: &RiskContext) -> Result<(), RiskRejection> {
        let (Some(price), Some(mark), Some(mark_at)) = (ctx.price, ctx.last_mark_price, ctx.last_mark_at) else {
            return Ok(());
        };
        let age = (ctx.now - mark_at).to_std().unwrap_or(Duration::MAX);
        if age > self.freshness {
            return Ok(());
        }
        if mark == Decimal::ZERO {
            return Ok(());
        }

        let deviation_percent = ((price - mark) / mark).abs() * Decimal::from(100);
        if deviation_percent > self.percent {
            return Err(RiskRejection {
                code: RiskRejectionCode::PriceOutOfBand,
                reason: format!(
                    "price {price} deviates {deviation_percent}% from mark {mark}, exceeding the {}% band",
                    self.percent
                ),
            });
        }
        Ok(())
    }
}

/// Runs every registered check in order, short-circuiting on the first rejection
/// (spec §4.4: "(a) vocabulary mapping; (b) ...; (c) ..." is evaluated left to right).
#[derive(Debug, Default)]
pub struct PreTradeGate {
    checks: Vec<Box<dyn RiskCheck>>,
}

impl PreTradeGate {
    pub fn new(checks: Vec<Box<dyn RiskCheck>>) -> Self {
        Self { checks }
    }

    pub fn evaluate(&self, ctx: &RiskContext) -> Result<(), RiskRejection> {
        for check in &self.checks {
            if let Err(rejection) = check.check(ctx) {
                tracing::warn!(check = check.name(), reason = %rejection.reason, "pre-trade gate rejected order");
                return Err(rejection);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ctx() -> RiskContext {
        RiskContext {
            user_id: UserId::from("u1"),
            symbol: "AAPL".into(),
            side: Side::Buy,
            price: Some(dec!(175)),
            outstanding_orders_for_user: 0,
            last_mark_price: Some(dec!(175)),
            last_mark_at: Some(Utc::now()),
            now: Utc::now(),
        }
    }

    #[test]
    fn max_outstanding_orders_rejects_at_the_limit() {
        let check = MaxOutstandingOrdersCheck { max: 5 };
        let mut context = ctx();
        context.outstanding_orders_for_user = 5;
        assert!(check.check(&context).is_err());
        context.outstanding_orders_for_user = 4;
        assert!(check.check(&context).is_ok());
    }

    #[test]
    fn price_band_rejects_far_off_price_matches_spec_scenario_3() {
        let check = PriceBandCheck::default();
        let mut context = ctx();
        context.price = Some(dec!(0.01));
        context.last_mark_price = Some(dec!(175));
        context.last_mark_at = Some(context.now);
        let err = check.check(&context).unwrap_err();
        assert_eq!(err.code, RiskRejectionCode::PriceOutOfBand);
    }

    #[test]
    fn price_band_ignores_a_stale_mark() {
        let check = PriceBandCheck {
            percent: dec!(20),
            freshness: Duration::from_secs(2),
        };
        let mut context = ctx();
        context.price = Some(dec!(0.01));
        context.last_mark_at = Some(context.now - chrono::Duration::seconds(10));
        assert!(check.check(&context).is_ok());
    }

    #[test]
    fn pre_trade_gate_short_circuits_on_first_rejection() {
        let gate = PreTradeGate::new(vec![
            Box::new(MaxOutstandingOrdersCheck { max: 0 }),
            Box::new(PriceBandCheck::default()),
        ]);
        let err = gate.evaluate(&ctx()).unwrap_err();
        assert_eq!(err.code, RiskRejectionCode::MaxOutstandingOrders);
    }
}
