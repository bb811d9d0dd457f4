#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments)]

//! # Markets
//!
//! Shared broker/order/instrument vocabulary used by every other crate in the gateway
//! workspace: [`BrokerKind`](broker::BrokerKind), [`Side`](order::Side),
//! [`OrderType`](order::OrderType), [`TimeInForce`](order::TimeInForce),
//! [`ProductType`](order::ProductType), [`ExchangeSegment`](order::ExchangeSegment), and
//! the order status state machine ([`OrderStatus`](order::OrderStatus)).
//!
//! This crate defines the *canonical* representation only. Per-broker wire vocabulary
//! and the bidirectional maps between canonical and wire values live in
//! `gateway-execution::codec`.

pub mod broker;
pub mod order;

pub use broker::{BrokerKind, UserId};
pub use order::{ExchangeSegment, OrderStatus, OrderType, ProductType, Side, Symbol, TimeInForce};
