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

//! # Integration
//!
//! Low-level, protocol-agnostic plumbing shared by every other crate in the gateway
//! workspace: error types, channel abstractions, small fast collections, and the
//! [`Snapshot`](snapshot::Snapshot) wrapper used to mark "this is the full state, not
//! a delta" throughout the Order/Position/Streaming model.
//!
//! Nothing in this crate knows about brokers, orders, or positions - it exists so that
//! [`gateway-execution`](https://docs.rs/gateway-execution) and
//! [`gateway-core`](https://docs.rs/gateway-core) don't each reinvent it.

pub mod channel;
pub mod collection;
pub mod error;
pub mod snapshot;

pub use error::{SocketError, Terminal, Unrecoverable, Validator};
pub use snapshot::Snapshot;
