use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// The three upstream broker APIs the gateway routes to.
///
/// Immutable once an [`Order`](crate::order::Order) is created: an order's `broker_kind`
/// never changes post-creation (invariant I4).
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumIter,
    EnumString,
    AsRefStr,
    Display,
)]
pub enum BrokerKind {
    #[strum(serialize = "XTS_PRO")]
    #[serde(rename = "XTS_PRO")]
    XtsPro,
    #[strum(serialize = "XTS_CLIENT")]
    #[serde(rename = "XTS_CLIENT")]
    XtsClient,
    #[strum(serialize = "ZERODHA")]
    #[serde(rename = "ZERODHA")]
    Zerodha,
}

impl BrokerKind {
    /// Whether this broker's wire protocol requires the dealer-on-behalf `clientId`
    /// parameter on every trading call (XTS Client only).
    pub fn requires_dealer_client_id(self) -> bool {
        matches!(self, BrokerKind::XtsClient)
    }

    /// Whether login is a single REST call (XTS) or a two-step request-token exchange
    /// (Zerodha).
    pub fn two_step_auth(self) -> bool {
        matches!(self, BrokerKind::Zerodha)
    }

    /// Whether the broker issues a refresh token, or must be fully relogged-in instead.
    pub fn supports_refresh_token(self) -> bool {
        !matches!(self, BrokerKind::Zerodha)
    }
}

/// A user identifier, opaque to the gateway core (owned by the external auth system).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
