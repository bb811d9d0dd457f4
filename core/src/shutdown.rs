//! # Shutdown Management
//!
//! Traits for components that need to wind down cleanly when the gateway system stops:
//! flush in-flight submits, stop the reconciler loop, and drop streaming subscribers
//! without losing already-acked state.

use serde::{Deserialize, Serialize};
use std::future::Future;

/// Components that can be shut down immediately, with no async operations.
pub trait SyncShutdown {
    type Result;
    fn shutdown(&mut self) -> Self::Result;
}

/// Components that need to perform async operations to shut down cleanly (e.g.
/// draining a streaming queue or cancelling a spawned task).
pub trait AsyncShutdown {
    type Result;
    fn shutdown(&mut self) -> impl Future<Output = Self::Result>;
}

/// A shutdown signal, usable as a marker in an event stream or control channel.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize, Serialize)]
pub struct Shutdown;
