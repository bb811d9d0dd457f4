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
#![allow(clippy::type_complexity, clippy::too_many_arguments, type_alias_bounds)]

//! Pre-trade risk gate: the narrow set of checks the Order Routing & Lifecycle Engine
//! runs before dispatching to an adapter. Deeper business risk lives outside this core.

pub mod check;

pub use check::{
    MaxOutstandingOrdersCheck, PreTradeGate, PriceBandCheck, RiskCheck, RiskContext, RiskRejection, RiskRejectionCode,
};
