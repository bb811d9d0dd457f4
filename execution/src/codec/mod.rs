//! # Codec Layer
//!
//! Per-adapter wire encoders/decoders and vocabulary maps (spec §4.1). Each adapter
//! owns a bidirectional [`VocabTable`] for order side/type/product/TIF/exchange
//! segment; encoding an unsupported canonical value, or decoding an unrecognised wire
//! value, produces a [`GatewayErrorKind::Validation`] before any network call -
//! invariant P6 (vocabulary round-trip) depends on these tables being total bijections
//! over the *supported* subset.

pub mod xts;
pub mod zerodha;

use crate::error::GatewayErrorKind;
use crate::order::OrderIntent;
use gateway_markets::{OrderType, ProductType, TimeInForce};
use rust_decimal::Decimal;

/// Static declaration of what an adapter supports, consulted by the engine before
/// dispatch (spec §4.1). Mapping/validation failures produce a `ValidationError`
/// before any network call.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub order_types: &'static [OrderType],
    pub product_types: &'static [ProductType],
    pub tifs: &'static [TimeInForce],
    /// `true` if the broker natively supports order modification; `false` if the
    /// Router must emulate it via cancel+replace (spec §4.4, §4.7).
    pub native_modify: bool,
    /// `true` if every trading call must additionally carry a dealer-on-behalf
    /// `clientId` (XTS Client only).
    pub dealer_on_behalf: bool,
    /// `true` if login is a two-step request-token exchange (Zerodha).
    pub two_step_auth: bool,
}

/// Parameter validation shared by every adapter (spec §4.1): rejects with
/// `ValidationError` when qty <= 0, LIMIT without price, STOP/STOP_LIMIT without
/// stop_price, or an enum value the capability set doesn't declare support for.
pub fn validate_intent(intent: &OrderIntent, caps: &Capabilities) -> Result<(), GatewayErrorKind> {
    if intent.qty <= Decimal::ZERO {
        return Err(GatewayErrorKind::validation("qty must be > 0"));
    }
    if intent.order_type.requires_price() && intent.price.is_none() {
        return Err(GatewayErrorKind::validation(format!(
            "{:?} requires a price",
            intent.order_type
        )));
    }
    if intent.order_type.requires_stop_price() && intent.stop_price.is_none() {
        return Err(GatewayErrorKind::validation(format!(
            "{:?} requires a stop_price",
            intent.order_type
        )));
    }
    if !caps.order_types.contains(&intent.order_type) {
        return Err(GatewayErrorKind::validation(format!(
            "order type {:?} unsupported by this broker's capability set",
            intent.order_type
        )));
    }
    if !caps.product_types.contains(&intent.product_type) {
        return Err(GatewayErrorKind::validation(format!(
            "product type {:?} unsupported by this broker's capability set",
            intent.product_type
        )));
    }
    if !caps.tifs.contains(&intent.tif) {
        return Err(GatewayErrorKind::validation(format!(
            "time in force {:?} unsupported by this broker's capability set",
            intent.tif
        )));
    }
    Ok(())
}

/// A small bidirectional lookup between a canonical enum value and its wire string,
/// backed by a static array rather than a runtime-built `HashMap` - the vocabularies
/// are tiny (at most a handful of variants) and fixed at compile time per adapter.
#[derive(Debug, Clone, Copy)]
pub struct VocabTable<T: 'static> {
    pub pairs: &'static [(T, &'static str)],
}

impl<T> VocabTable<T>
where
    T: Copy + Eq + std::fmt::Debug,
{
    pub fn encode(&self, value: T) -> Result<&'static str, GatewayErrorKind> {
        self.pairs
            .iter()
            .find_map(|(canonical, wire)| (*canonical == value).then_some(*wire))
            .ok_or_else(|| {
                GatewayErrorKind::validation(format!(
                    "unsupported value for this broker's vocabulary: {value:?}"
                ))
            })
    }

    pub fn decode(&self, wire: &str) -> Result<T, GatewayErrorKind> {
        self.pairs
            .iter()
            .find_map(|(canonical, w)| (*w == wire).then_some(*canonical))
            .ok_or_else(|| {
                GatewayErrorKind::validation(format!(
                    "unrecognised upstream wire value: {wire}"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Demo {
        A,
        B,
    }

    const TABLE: VocabTable<Demo> = VocabTable {
        pairs: &[(Demo::A, "a_wire"), (Demo::B, "b_wire")],
    };

    #[test]
    fn vocab_table_round_trips_every_supported_value() {
        for value in [Demo::A, Demo::B] {
            let wire = TABLE.encode(value).unwrap();
            assert_eq!(TABLE.decode(wire).unwrap(), value);
        }
    }

    #[test]
    fn vocab_table_rejects_unknown_wire_value() {
        assert!(TABLE.decode("nonsense").is_err());
    }

    use crate::order::OrderIntent;
    use gateway_markets::{ExchangeSegment, Side};
    use rust_decimal_macros::dec;

    const CAPS: Capabilities = Capabilities {
        order_types: &[OrderType::Market, OrderType::Limit],
        product_types: &[ProductType::Delivery],
        tifs: &[TimeInForce::Day, TimeInForce::Gtc],
        native_modify: true,
        dealer_on_behalf: false,
        two_step_auth: false,
    };

    fn base_intent() -> OrderIntent {
        OrderIntent {
            client_order_id: None,
            symbol: "AAPL".into(),
            exchange_segment: ExchangeSegment::NseEq,
            side: Side::Buy,
            order_type: OrderType::Limit,
            qty: dec!(10),
            price: Some(dec!(100)),
            stop_price: None,
            product_type: ProductType::Delivery,
            tif: TimeInForce::Gtc,
        }
    }

    #[test]
    fn validate_intent_rejects_non_positive_qty() {
        let mut intent = base_intent();
        intent.qty = dec!(0);
        assert!(validate_intent(&intent, &CAPS).is_err());
    }

    #[test]
    fn validate_intent_rejects_limit_without_price() {
        let mut intent = base_intent();
        intent.price = None;
        assert!(validate_intent(&intent, &CAPS).is_err());
    }

    #[test]
    fn validate_intent_rejects_stop_without_stop_price() {
        let mut intent = base_intent();
        intent.order_type = OrderType::Stop;
        assert!(validate_intent(&intent, &CAPS).is_err());
    }

    #[test]
    fn validate_intent_rejects_unsupported_enum_for_capability_set() {
        let mut intent = base_intent();
        intent.tif = TimeInForce::Fok;
        assert!(validate_intent(&intent, &CAPS).is_err());
    }

    #[test]
    fn validate_intent_accepts_well_formed_supported_intent() {
        assert!(validate_intent(&base_intent(), &CAPS).is_ok());
    }
}
