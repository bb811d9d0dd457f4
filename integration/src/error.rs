use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Low-level transport/protocol error shared by every integration primitive
/// (HTTP signing, WebSocket framing, de/serialisation).
///
/// Higher layers (codec, broker client, router) translate this into the
/// unified error taxonomy rather than surfacing it directly.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Error)]
pub enum SocketError {
    #[error("socket sink error: {0}")]
    Sink(String),

    #[error("deserialisation error: {error} for payload: {payload}")]
    Deserialise { error: String, payload: String },

    #[error("serialisation error: {0}")]
    Serialise(String),

    #[error("subscription rejected by upstream: {0}")]
    Subscribe(String),

    #[error("http error: status {status} body {body}")]
    Http { status: u16, body: String },

    #[error("websocket closed: {0}")]
    WebSocketClosed(String),
}

/// Implementors can validate that their own state is coherent enough to be used.
pub trait Validator {
    fn validate(self) -> Result<Self, SocketError>
    where
        Self: Sized;
}

/// Implementors can report whether an error/state is unrecoverable, i.e. retrying
/// locally will never help (contrast with a transient network blip).
pub trait Unrecoverable {
    fn is_unrecoverable(&self) -> bool;
}

impl Unrecoverable for SocketError {
    fn is_unrecoverable(&self) -> bool {
        matches!(
            self,
            SocketError::Subscribe(_) | SocketError::Deserialise { .. }
        )
    }
}

/// Indicates something is terminal and requires shutdown/restart of its owner.
pub trait Terminal {
    fn is_terminal(&self) -> bool;
}
