//! # Position Tracker
//!
//! Sole writer of derived per-user position state (spec §4.5, invariant I5/P4).
//! Positions are created lazily on first fill and never deleted — a flat position is
//! retained at zero qty for the trading session rather than removed.

use chrono::{DateTime, Utc};
use gateway_markets::{BrokerKind, ExchangeSegment, ProductType, Side, Symbol, UserId};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PositionKey {
    pub user_id: UserId,
    pub broker_kind: BrokerKind,
    pub exchange_segment: ExchangeSegment,
    pub symbol: Symbol,
    pub product_type: ProductType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub key: PositionKey,
    pub buy_qty: Decimal,
    pub sell_qty: Decimal,
    pub avg_price: Decimal,
    pub realized_pnl: Decimal,
    pub last_mark_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub value: Decimal,
    pub updated_at: DateTime<Utc>,
    last_tick_at: Option<DateTime<Utc>>,
}

impl Position {
    fn flat(key: PositionKey, now: DateTime<Utc>) -> Self {
        Self {
            key,
            buy_qty: Decimal::ZERO,
            sell_qty: Decimal::ZERO,
            avg_price: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            last_mark_price: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            value: Decimal::ZERO,
            updated_at: now,
            last_tick_at: None,
        }
    }

    pub fn net_qty(&self) -> Decimal {
        self.buy_qty - self.sell_qty
    }

    fn recompute_derived(&mut self) {
        let net = self.net_qty();
        self.value = net.abs() * self.last_mark_price;
        self.unrealized_pnl = if net > Decimal::ZERO {
            (self.last_mark_price - self.avg_price) * net
        } else if net < Decimal::ZERO {
            (self.avg_price - self.last_mark_price) * net.abs()
        } else {
            Decimal::ZERO
        };
    }
}

/// Derives position mutations from fills and last-trade ticks (spec §4.5 algorithm).
#[derive(Debug)]
pub struct PositionTracker {
    positions: Mutex<HashMap<PositionKey, Position>>,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self {
            positions: Mutex::new(HashMap::new()),
        }
    }

    pub fn snapshot(&self, key: &PositionKey) -> Option<Position> {
        self.positions.lock().get(key).cloned()
    }

    /// Applies one fill (invariant I5, spec §4.5 algorithm): buys extend or flip a
    /// short; sells reduce or flip a long; reducing fills realize PnL on the portion
    /// that closes existing exposure.
    pub fn apply_fill(&self, key: PositionKey, side: Side, qty: Decimal, price: Decimal, now: DateTime<Utc>) {
        let mut positions = self.positions.lock();
        let position = positions.entry(key.clone()).or_insert_with(|| Position::flat(key, now));

        match side {
            Side::Buy => {
                let net = position.net_qty();
                if net >= Decimal::ZERO {
                    let new_qty = position.buy_qty + qty;
                    if new_qty > Decimal::ZERO {
                        position.avg_price = (position.avg_price * position.buy_qty + price * qty) / new_qty;
                    }
                    position.buy_qty = new_qty;
                } else {
                    let closing = qty.min(net.abs());
                    position.realized_pnl += (position.avg_price - price) * closing;
                    let remainder = qty - closing;
                    position.buy_qty += qty;
                    if remainder > Decimal::ZERO {
                        // flipped through flat into a new long, opened at this fill's price
                        position.avg_price = price;
                    }
                }
            }
            Side::Sell => {
                let net = position.net_qty();
                if net > Decimal::ZERO {
                    let closing = qty.min(net);
                    position.realized_pnl += (price - position.avg_price) * closing;
                    let remainder = qty - closing;
                    position.sell_qty += qty;
                    if remainder > Decimal::ZERO {
                        position.avg_price = price;
                    }
                } else {
                    let new_qty = position.sell_qty + qty;
                    let short_qty = new_qty - position.buy_qty.min(new_qty);
                    let prior_short_qty = (position.sell_qty - position.buy_qty).max(Decimal::ZERO);
                    if short_qty > Decimal::ZERO {
                        position.avg_price =
                            (position.avg_price * prior_short_qty + price * qty) / (prior_short_qty + qty);
                    }
                    position.sell_qty = new_qty;
                }
            }
        }

        position.updated_at = now;
        position.recompute_derived();
    }

    /// Applies a last-trade tick. Ticks older than the last applied tick for this
    /// symbol are discarded (spec §4.5).
    pub fn apply_tick(&self, key: PositionKey, price: Decimal, at: DateTime<Utc>) {
        let mut positions = self.positions.lock();
        let position = positions.entry(key.clone()).or_insert_with(|| Position::flat(key, at));

        if let Some(last) = position.last_tick_at {
            if at <= last {
                return;
            }
        }
        position.last_mark_price = price;
        position.last_tick_at = Some(at);
        position.updated_at = at;
        position.recompute_derived();
    }
}

impl Default for PositionTracker {
    fn default() -> Self {
        Self::new()
    }
}
