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

//! Broker Integration & Order Routing Core: the codec layer, transport primitives,
//! the three BrokerClient adapters, the Session Manager, the Order Routing &
//! Lifecycle Engine, the Position Tracker, and the Streaming Hub.

pub mod client;
pub mod codec;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod order;
pub mod position;
pub mod session;
pub mod streaming;
pub mod transport;

pub use client::{BrokerClient, LoginCredentials, SessionToken};
pub use engine::Router;
pub use error::{ErrorCode, GatewayError, GatewayErrorKind};
pub use order::{BrokerAck, ClientOrderId, ExecutionReport, ModifyIntent, Order, OrderId, OrderIntent};
pub use position::PositionTracker;
pub use session::SessionManager;
pub use streaming::StreamHandle;
