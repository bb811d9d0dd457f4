//! Zerodha codec.
//!
//! Two-step auth (request token -> session token), no refresh token - relogin is
//! required instead. Modify is native only for the LIMIT price field; every other
//! modification is emulated via cancel+replace (spec §4.7). Trigger price is required
//! for the two stop variants, which validation enforces via the shared
//! [`validate_intent`](super::validate_intent) stop-price check.

use super::{Capabilities, VocabTable};
use gateway_markets::{ExchangeSegment, OrderType, ProductType, Side, TimeInForce};

pub const CAPABILITIES: Capabilities = Capabilities {
    order_types: &[
        OrderType::Market,
        OrderType::Limit,
        OrderType::Stop,
        OrderType::StopLimit,
    ],
    product_types: &[ProductType::Intraday, ProductType::Delivery, ProductType::Margin],
    tifs: &[TimeInForce::Day, TimeInForce::Ioc],
    native_modify: false,
    dealer_on_behalf: false,
    two_step_auth: true,
};

pub const SIDE: VocabTable<Side> = VocabTable {
    pairs: &[(Side::Buy, "BUY"), (Side::Sell, "SELL")],
};

pub const ORDER_TYPE: VocabTable<OrderType> = VocabTable {
    pairs: &[
        (OrderType::Market, "MARKET"),
        (OrderType::Limit, "LIMIT"),
        (OrderType::Stop, "SL-M"),
        (OrderType::StopLimit, "SL"),
    ],
};

pub const TIME_IN_FORCE: VocabTable<TimeInForce> = VocabTable {
    pairs: &[(TimeInForce::Day, "DAY"), (TimeInForce::Ioc, "IOC")],
};

pub const PRODUCT_TYPE: VocabTable<ProductType> = VocabTable {
    pairs: &[
        (ProductType::Intraday, "MIS"),
        (ProductType::Delivery, "CNC"),
        (ProductType::Margin, "NRML"),
    ],
};

pub const EXCHANGE_SEGMENT: VocabTable<ExchangeSegmentWire> = VocabTable {
    pairs: &[
        (ExchangeSegmentWire::NseEq, "NSE"),
        (ExchangeSegmentWire::NseFo, "NFO"),
        (ExchangeSegmentWire::NseCd, "CDS"),
        (ExchangeSegmentWire::BseEq, "BSE"),
        (ExchangeSegmentWire::BseFo, "BFO"),
        (ExchangeSegmentWire::Mcx, "MCX"),
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeSegmentWire {
    NseEq,
    NseFo,
    NseCd,
    BseEq,
    BseFo,
    Mcx,
}

impl TryFrom<&ExchangeSegment> for ExchangeSegmentWire {
    type Error = ();

    fn try_from(value: &ExchangeSegment) -> Result<Self, Self::Error> {
        Ok(match value {
            ExchangeSegment::NseEq => ExchangeSegmentWire::NseEq,
            ExchangeSegment::NseFo => ExchangeSegmentWire::NseFo,
            ExchangeSegment::NseCd => ExchangeSegmentWire::NseCd,
            ExchangeSegment::BseEq => ExchangeSegmentWire::BseEq,
            ExchangeSegment::BseFo => ExchangeSegmentWire::BseFo,
            ExchangeSegment::Mcx => ExchangeSegmentWire::Mcx,
            ExchangeSegment::Other(_) => return Err(()),
        })
    }
}

impl From<ExchangeSegmentWire> for ExchangeSegment {
    fn from(value: ExchangeSegmentWire) -> Self {
        match value {
            ExchangeSegmentWire::NseEq => ExchangeSegment::NseEq,
            ExchangeSegmentWire::NseFo => ExchangeSegment::NseFo,
            ExchangeSegmentWire::NseCd => ExchangeSegment::NseCd,
            ExchangeSegmentWire::BseEq => ExchangeSegment::BseEq,
            ExchangeSegmentWire::BseFo => ExchangeSegment::BseFo,
            ExchangeSegmentWire::Mcx => ExchangeSegment::Mcx,
        }
    }
}

/// A modification that Zerodha can apply in place vs one it must emulate via
/// cancel+replace (spec §4.7: native for LIMIT price, emulated otherwise).
pub fn modify_is_native(new_qty: Option<rust_decimal::Decimal>, new_price: Option<rust_decimal::Decimal>) -> bool {
    new_qty.is_none() && new_price.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn zerodha_has_no_refresh_token_and_two_step_auth() {
        assert!(CAPABILITIES.two_step_auth);
        assert!(!CAPABILITIES.native_modify);
    }

    #[test]
    fn price_only_modify_is_native_anything_else_is_emulated() {
        assert!(modify_is_native(None, Some(dec!(101))));
        assert!(!modify_is_native(Some(dec!(5)), Some(dec!(101))));
        assert!(!modify_is_native(Some(dec!(5)), None));
    }

    #[test]
    fn zerodha_vocab_round_trips_every_supported_order_type() {
        for ty in [OrderType::Market, OrderType::Limit, OrderType::Stop, OrderType::StopLimit] {
            assert_eq!(ORDER_TYPE.decode(ORDER_TYPE.encode(ty).unwrap()).unwrap(), ty);
        }
    }
}
