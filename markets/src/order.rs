use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Order side.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, EnumString, AsRefStr, Display,
)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Order type, as understood by the gateway's canonical vocabulary. Each
/// [`BrokerKind`](crate::broker::BrokerKind) adapter maps this to (and from) its own
/// wire representation; an adapter that doesn't support a given variant rejects it with
/// a `ValidationError` before any network call.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, EnumString, AsRefStr, Display,
)]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

impl OrderType {
    pub fn requires_price(self) -> bool {
        matches!(self, OrderType::Limit | OrderType::StopLimit)
    }

    pub fn requires_stop_price(self) -> bool {
        matches!(self, OrderType::Stop | OrderType::StopLimit)
    }
}

/// Time in force.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, EnumString, AsRefStr, Display,
)]
pub enum TimeInForce {
    #[strum(serialize = "DAY")]
    Day,
    #[strum(serialize = "GTC")]
    Gtc,
    #[strum(serialize = "IOC")]
    Ioc,
    #[strum(serialize = "FOK")]
    Fok,
}

/// Product type a broker trades an instrument under (intraday margin vs carry-forward
/// delivery, etc). Canonical set shared by all three adapters; each maps a subset.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, EnumString, AsRefStr, Display,
)]
pub enum ProductType {
    Intraday,
    Delivery,
    Margin,
    CoverOrder,
    BracketOrder,
}

/// Exchange segment an instrument trades under. `Other` keeps the vocabulary open for
/// segments a given broker supports that the others don't, without widening every
/// adapter's match arms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeSegment {
    NseEq,
    NseFo,
    NseCd,
    BseEq,
    BseFo,
    Mcx,
    Other(String),
}

impl std::fmt::Display for ExchangeSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExchangeSegment::NseEq => write!(f, "NSE_EQ"),
            ExchangeSegment::NseFo => write!(f, "NSE_FO"),
            ExchangeSegment::NseCd => write!(f, "NSE_CD"),
            ExchangeSegment::BseEq => write!(f, "BSE_EQ"),
            ExchangeSegment::BseFo => write!(f, "BSE_FO"),
            ExchangeSegment::Mcx => write!(f, "MCX"),
            ExchangeSegment::Other(s) => write!(f, "{s}"),
        }
    }
}

/// The order status state machine from spec §3:
///
/// `NEW -> PENDING -> OPEN -> {PARTIALLY_FILLED <-> OPEN} -> FILLED | CANCELLED | REJECTED | EXPIRED`
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum OrderStatus {
    New,
    Pending,
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

impl OrderStatus {
    /// Terminal statuses are never overwritten (invariant I3).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }
}

/// Symbol identifying a tradable instrument on a given exchange segment, broker-agnostic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol(pub smol_str::SmolStr);

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Self(smol_str::SmolStr::new(value))
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_opposite_is_involutive() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite().opposite(), Side::Sell);
    }

    #[test]
    fn order_type_price_requirements_match_spec() {
        assert!(OrderType::Limit.requires_price());
        assert!(OrderType::StopLimit.requires_price());
        assert!(!OrderType::Market.requires_price());
        assert!(!OrderType::Stop.requires_price());

        assert!(OrderType::Stop.requires_stop_price());
        assert!(OrderType::StopLimit.requires_stop_price());
        assert!(!OrderType::Market.requires_stop_price());
        assert!(!OrderType::Limit.requires_stop_price());
    }

    #[test]
    fn only_terminal_statuses_report_terminal() {
        for status in [
            OrderStatus::Filled,
            OrderStatus::Cancelled,
            OrderStatus::Rejected,
            OrderStatus::Expired,
        ] {
            assert!(status.is_terminal());
        }
        for status in [
            OrderStatus::New,
            OrderStatus::Pending,
            OrderStatus::Open,
            OrderStatus::PartiallyFilled,
        ] {
            assert!(!status.is_terminal());
        }
    }
}
