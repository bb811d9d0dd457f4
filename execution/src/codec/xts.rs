//! XTS PRO / XTS Client codec.
//!
//! The two variants share almost every endpoint and the entire wire vocabulary; they
//! differ in the dealer-on-behalf `clientId` parameter XTS Client must attach to every
//! trading call, token lifetime, and the stream authentication payload (spec §4.7).
//! One shared skeleton parameterised by [`XtsVariant`] captures this rather than
//! duplicating the adapter.

use super::{Capabilities, VocabTable};
use gateway_markets::{ExchangeSegment, OrderType, ProductType, Side, TimeInForce};

/// Which of the two XTS products this adapter instance talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XtsVariant {
    Pro,
    Client,
}

impl XtsVariant {
    pub const fn capabilities(self) -> Capabilities {
        Capabilities {
            order_types: &[
                OrderType::Market,
                OrderType::Limit,
                OrderType::Stop,
                OrderType::StopLimit,
            ],
            product_types: &[ProductType::Intraday, ProductType::Delivery, ProductType::Margin],
            tifs: &[TimeInForce::Day, TimeInForce::Ioc],
            native_modify: true,
            dealer_on_behalf: matches!(self, XtsVariant::Client),
            two_step_auth: false,
        }
    }
}

pub const SIDE: VocabTable<Side> = VocabTable {
    pairs: &[(Side::Buy, "BUY"), (Side::Sell, "SELL")],
};

pub const ORDER_TYPE: VocabTable<OrderType> = VocabTable {
    pairs: &[
        (OrderType::Market, "MARKET"),
        (OrderType::Limit, "LIMIT"),
        (OrderType::Stop, "STOPMARKET"),
        (OrderType::StopLimit, "STOPLIMIT"),
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
        (ExchangeSegmentWire::NseEq, "NSECM"),
        (ExchangeSegmentWire::NseFo, "NSEFO"),
        (ExchangeSegmentWire::NseCd, "NSECD"),
        (ExchangeSegmentWire::BseEq, "BSECM"),
        (ExchangeSegmentWire::BseFo, "BSEFO"),
        (ExchangeSegmentWire::Mcx, "MCXFO"),
    ],
};

/// Wrapper so [`ExchangeSegment::Other`] (which carries a `String` and so can't itself
/// be `Copy`) doesn't need to participate in the static [`VocabTable`] lookup.
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xts_client_requires_dealer_on_behalf_but_pro_does_not() {
        assert!(XtsVariant::Client.capabilities().dealer_on_behalf);
        assert!(!XtsVariant::Pro.capabilities().dealer_on_behalf);
    }

    #[test]
    fn xts_vocab_round_trips_every_supported_side_and_order_type() {
        for side in [Side::Buy, Side::Sell] {
            assert_eq!(SIDE.decode(SIDE.encode(side).unwrap()).unwrap(), side);
        }
        for ty in [OrderType::Market, OrderType::Limit, OrderType::Stop, OrderType::StopLimit] {
            assert_eq!(ORDER_TYPE.decode(ORDER_TYPE.encode(ty).unwrap()).unwrap(), ty);
        }
    }

    #[test]
    fn exchange_segment_wire_round_trips_through_canonical_type() {
        for seg in [
            ExchangeSegment::NseEq,
            ExchangeSegment::NseFo,
            ExchangeSegment::NseCd,
            ExchangeSegment::BseEq,
            ExchangeSegment::BseFo,
            ExchangeSegment::Mcx,
        ] {
            let wire = ExchangeSegmentWire::try_from(&seg).unwrap();
            let back: ExchangeSegment = wire.into();
            assert_eq!(back, seg);
        }
    }

    #[test]
    fn other_exchange_segment_is_not_representable_on_xts() {
        let seg = ExchangeSegment::Other("CUSTOM".into());
        assert!(ExchangeSegmentWire::try_from(&seg).is_err());
    }
}
