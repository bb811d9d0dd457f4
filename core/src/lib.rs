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

//! Top-level wiring for the multi-broker trading gateway: configuration, logging,
//! shutdown, and the [`system::GatewaySystemBuilder`] that assembles the Session
//! Manager, Order Routing & Lifecycle Engine, Streaming Hub and Position Tracker into
//! one running system.

pub mod config;
pub mod error;
pub mod logging;
pub mod shutdown;
pub mod system;

pub use config::GatewayConfig;
pub use error::GatewayCoreError;
pub use shutdown::Shutdown;
pub use system::{GatewaySystem, GatewaySystemBuilder};
