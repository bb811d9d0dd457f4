//! # Transport Layer
//!
//! Per-broker HTTP and streaming primitives (spec §4.2), kept deliberately dumb: no
//! retry, no idempotency, no capability awareness. Those live in the codec and engine
//! layers, which is what lets the Router apply one retry/circuit-breaker policy across
//! every adapter uniformly.

pub mod http;
pub mod stream;

pub use http::{HttpOutcome, HttpTransport, HttpTransportConfig};
pub use stream::{EntityKey, HeartbeatMonitor, OverflowPolicy, ReconnectBackoff, SubscriberQueue};
