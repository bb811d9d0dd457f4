//! # Error Taxonomy & Recovery
//!
//! Unified error kinds shared by every adapter, the Session Manager, the Order
//! Routing & Lifecycle Engine, and the Streaming Hub (spec §7). Lower layers never
//! format user-facing messages; the Router is the single point that translates a
//! [`GatewayErrorKind`] into an external status code.

use chrono::{DateTime, Utc};
use gateway_integration::{Terminal, Unrecoverable};
use gateway_markets::BrokerKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Stable external error codes (spec §6), independent of the internal `Debug`
/// representation so that edge layers and tests can match on something that
/// won't shift if a variant is renamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    ValidationError,
    AuthFailed,
    RateLimited,
    BrokerRejected,
    UpstreamUnavailable,
    Internal,
}

/// The error kinds of spec §7, carried alongside enough context
/// (`brokerKind`, `upstreamCode`, `correlationId`) for the Router to decide on
/// retry/refresh/circuit-breaking without re-deriving it from a string.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum GatewayErrorKind {
    /// Caller-supplied data violates the contract (bad enum, qty <= 0, missing price).
    #[error("validation error: {reason}")]
    Validation { reason: String },

    /// Missing/invalid/expired session. The Router attempts a single refresh+retry
    /// before surfacing this.
    #[error("auth error: {reason}")]
    Auth { reason: String },

    /// Network timeout, 5xx, connection reset. `retryable = false` models DNS/TLS
    /// failures that backoff will never fix.
    #[error("transport error (retryable={retryable}): {reason}")]
    Transport { retryable: bool, reason: String },

    /// Upstream throttling; `retry_after` mirrors a `Retry-After` header when present.
    #[error("rate limited, retry_after={retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Upstream accepted the transport call but rejected the semantics (insufficient
    /// margin, position limit, market closed, ...). The upstream code is preserved.
    #[error("broker rejected: {upstream_code} {reason}")]
    BrokerReject {
        upstream_code: String,
        reason: String,
    },

    /// Operation not valid in the current state (eg/ modify on a terminal order).
    #[error("state error: {reason}")]
    State { reason: String },

    /// Unknown orderId/position/session.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// The circuit for this (broker, endpoint) is open; fast-failed with no upstream
    /// call.
    #[error("unavailable: circuit open for {endpoint}")]
    Unavailable { endpoint: String },

    /// Invariant violation or decoder bug. Logged + counted, surfaced opaquely.
    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl GatewayErrorKind {
    pub fn code(&self) -> ErrorCode {
        match self {
            GatewayErrorKind::Validation { .. } => ErrorCode::ValidationError,
            GatewayErrorKind::Auth { .. } => ErrorCode::AuthFailed,
            GatewayErrorKind::RateLimited { .. } => ErrorCode::RateLimited,
            GatewayErrorKind::BrokerReject { .. } => ErrorCode::BrokerRejected,
            GatewayErrorKind::Transport { .. } | GatewayErrorKind::Unavailable { .. } => {
                ErrorCode::UpstreamUnavailable
            }
            GatewayErrorKind::State { .. } | GatewayErrorKind::NotFound { .. } => {
                // these are surfaced as-is by the Router; Internal is the fallback
                // opaque code for anything that isn't one of the named externally
                // stable codes.
                ErrorCode::Internal
            }
            GatewayErrorKind::Internal { .. } => ErrorCode::Internal,
        }
    }

    /// Whether the Router's retry classifier should retry this with backoff. Rate
    /// limiting is retryable too (spec §7: "backoff honoring Retry-After... surfaced to
    /// caller after budget exhausted") — `retry_with_backoff` honors any `retry_after`
    /// it carries instead of the generic exponential delay.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayErrorKind::Transport { retryable: true, .. } | GatewayErrorKind::RateLimited { .. }
        )
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub fn auth(reason: impl Into<String>) -> Self {
        Self::Auth {
            reason: reason.into(),
        }
    }

    pub fn transport(retryable: bool, reason: impl Into<String>) -> Self {
        Self::Transport {
            retryable,
            reason: reason.into(),
        }
    }

    pub fn state(reason: impl Into<String>) -> Self {
        Self::State {
            reason: reason.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }
}

/// A non-retryable kind is unrecoverable from this crate's own retry loop - it either
/// needs operator/caller intervention (validation, not-found) or a circuit to trip
/// (transport/unavailable) rather than another local attempt.
impl Unrecoverable for GatewayErrorKind {
    fn is_unrecoverable(&self) -> bool {
        !self.is_retryable()
    }
}

/// Errors that indicate the session or connection they came from should not simply be
/// reused for the next call: an expired/invalid session (`Auth`) or a bug surfaced as
/// `Internal` both warrant tearing down and re-establishing state rather than retrying
/// in place.
impl Terminal for GatewayErrorKind {
    fn is_terminal(&self) -> bool {
        matches!(self, GatewayErrorKind::Auth { .. } | GatewayErrorKind::Internal { .. })
    }
}

/// Every error that escapes a broker adapter, the Session Manager, the Order Engine,
/// or the Streaming Hub carries this envelope (spec §7 propagation policy).
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{kind}")]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub broker_kind: Option<BrokerKind>,
    pub upstream_code: Option<String>,
    pub correlation_id: String,
    #[serde(skip, default = "Utc::now")]
    pub at: DateTime<Utc>,
}

impl GatewayError {
    pub fn new(kind: GatewayErrorKind, correlation_id: impl Into<String>) -> Self {
        Self {
            kind,
            broker_kind: None,
            upstream_code: None,
            correlation_id: correlation_id.into(),
            at: Utc::now(),
        }
    }

    pub fn with_broker(mut self, broker_kind: BrokerKind) -> Self {
        self.broker_kind = Some(broker_kind);
        self
    }

    pub fn with_upstream_code(mut self, code: impl Into<String>) -> Self {
        self.upstream_code = Some(code.into());
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.kind.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_transport_errors_and_rate_limiting_are_retryable() {
        assert!(GatewayErrorKind::transport(true, "timeout").is_retryable());
        assert!(GatewayErrorKind::RateLimited { retry_after: None }.is_retryable());
        assert!(!GatewayErrorKind::transport(false, "dns").is_retryable());
        assert!(!GatewayErrorKind::validation("bad qty").is_retryable());
        assert!(!GatewayErrorKind::auth("expired").is_retryable());
    }

    #[test]
    fn unrecoverable_is_the_complement_of_retryable() {
        assert!(!GatewayErrorKind::transport(true, "timeout").is_unrecoverable());
        assert!(GatewayErrorKind::transport(false, "dns").is_unrecoverable());
        assert!(GatewayErrorKind::validation("bad qty").is_unrecoverable());
    }

    #[test]
    fn auth_and_internal_errors_are_terminal() {
        assert!(GatewayErrorKind::auth("expired").is_terminal());
        assert!(GatewayErrorKind::internal("decoder bug").is_terminal());
        assert!(!GatewayErrorKind::transport(true, "timeout").is_terminal());
        assert!(!GatewayErrorKind::validation("bad qty").is_terminal());
    }

    #[test]
    fn error_envelope_preserves_upstream_code_and_broker() {
        let err = GatewayError::new(
            GatewayErrorKind::BrokerReject {
                upstream_code: "E_MARGIN".into(),
                reason: "insufficient margin".into(),
            },
            "corr-1",
        )
        .with_broker(BrokerKind::Zerodha)
        .with_upstream_code("E_MARGIN");

        assert_eq!(err.broker_kind, Some(BrokerKind::Zerodha));
        assert_eq!(err.upstream_code.as_deref(), Some("E_MARGIN"));
        assert_eq!(err.code(), ErrorCode::BrokerRejected);
    }
}
