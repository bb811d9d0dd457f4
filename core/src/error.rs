//! # Core Error Types
//!
//! Aggregates errors from the subsystems `gateway-core` wires together, so callers of
//! the top-level system never need to match on `gateway-execution`'s or
//! `gateway-risk`'s error types directly.

use gateway_execution::GatewayError;
use gateway_risk::RiskRejection;
use thiserror::Error;

/// Central error type for the top-level gateway system.
#[derive(Debug, Error)]
pub enum GatewayCoreError {
    /// A broker integration / order routing error, passed through unchanged.
    #[error(transparent)]
    Execution(#[from] GatewayError),

    /// A pre-trade risk rejection that occurred outside the Router's own submit path
    /// (e.g. a standalone dry-run check requested by an edge layer).
    #[error(transparent)]
    Risk(#[from] RiskRejection),

    /// Configuration failed to parse or was missing a required key.
    #[error("configuration error: {0}")]
    Config(String),

    /// An async task this system spawned (the reconciler loop, a streaming pump) panicked
    /// or was cancelled.
    #[error("task join error: {0}")]
    Join(String),
}

impl From<tokio::task::JoinError> for GatewayCoreError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::Join(value.to_string())
    }
}
