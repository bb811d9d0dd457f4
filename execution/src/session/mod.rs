//! # Session Manager
//!
//! Owns the authenticated [`SessionToken`](crate::client::SessionToken) per
//! `(user, broker)` pair (spec §4.3): logs in, proactively refreshes or re-logs-in
//! ahead of expiry, and hands a live token to the Router on demand. Adapters never see
//! more than one token at a time and never manage their own expiry bookkeeping.

use crate::client::{BrokerClient, LoginCredentials, SessionToken};
use crate::error::GatewayErrorKind;
use chrono::{Duration as ChronoDuration, Utc};
use gateway_markets::{BrokerKind, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// How far ahead of expiry the manager proactively refreshes (spec §4.3): a session
/// used inside this window is renewed before being handed out rather than being
/// allowed to expire mid-flight.
const REFRESH_SKEW: ChronoDuration = ChronoDuration::seconds(300);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SessionKey {
    user_id: UserId,
    broker_kind: BrokerKind,
}

#[derive(Debug)]
pub struct SessionManager {
    clients: HashMap<BrokerKind, Arc<dyn BrokerClient>>,
    sessions: RwLock<HashMap<SessionKey, SessionToken>>,
    credentials: RwLock<HashMap<SessionKey, LoginCredentials>>,
}

impl SessionManager {
    pub fn new(clients: Vec<Arc<dyn BrokerClient>>) -> Self {
        let clients = clients.into_iter().map(|client| (client.kind(), client)).collect();
        Self {
            clients,
            sessions: RwLock::new(HashMap::new()),
            credentials: RwLock::new(HashMap::new()),
        }
    }

    fn client_for(&self, broker_kind: BrokerKind) -> Result<&Arc<dyn BrokerClient>, GatewayErrorKind> {
        self.clients
            .get(&broker_kind)
            .ok_or_else(|| GatewayErrorKind::internal(format!("no adapter registered for {broker_kind:?}")))
    }

    /// Performs the initial login and stores both the resulting session and the
    /// credentials, so a later forced relogin (two-step brokers have no refresh
    /// endpoint, spec §4.3) can proceed without the caller re-supplying them.
    pub async fn login(
        &self,
        user_id: UserId,
        broker_kind: BrokerKind,
        credentials: LoginCredentials,
    ) -> Result<(), GatewayErrorKind> {
        let client = self.client_for(broker_kind)?;
        let session = client.login(&credentials).await?;

        let key = SessionKey { user_id, broker_kind };
        self.credentials.write().await.insert(key.clone(), credentials);
        self.sessions.write().await.insert(key, session);
        Ok(())
    }

    pub async fn logout(&self, user_id: UserId, broker_kind: BrokerKind) -> Result<(), GatewayErrorKind> {
        let key = SessionKey { user_id, broker_kind };
        let session = self.sessions.write().await.remove(&key);
        self.credentials.write().await.remove(&key);
        if let Some(session) = session {
            let client = self.client_for(broker_kind)?;
            client.logout(&session).await?;
        }
        Ok(())
    }

    /// Returns a live session, refreshing or re-logging-in first if it's within
    /// [`REFRESH_SKEW`] of expiry. Fails with `Auth` if no session has ever been
    /// established for this `(user, broker)` pair.
    pub async fn session_for(
        &self,
        user_id: UserId,
        broker_kind: BrokerKind,
    ) -> Result<SessionToken, GatewayErrorKind> {
        let key = SessionKey {
            user_id: user_id.clone(),
            broker_kind,
        };
        let existing = self.sessions.read().await.get(&key).cloned();
        let Some(session) = existing else {
            return Err(GatewayErrorKind::auth(format!(
                "no session established for user {user_id:?} on {broker_kind:?}"
            )));
        };

        if Utc::now() + REFRESH_SKEW < session.expires_at {
            return Ok(session);
        }

        self.renew(key, session).await
    }

    async fn renew(&self, key: SessionKey, stale: SessionToken) -> Result<SessionToken, GatewayErrorKind> {
        let client = self.client_for(key.broker_kind)?;
        let renewed = match client.refresh(&stale).await {
            Ok(renewed) => renewed,
            Err(_) => {
                let credentials = self
                    .credentials
                    .read()
                    .await
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| GatewayErrorKind::auth("session expired and no credentials on file to relogin"))?;
                client.login(&credentials).await?
            }
        };
        self.sessions.write().await.insert(key, renewed.clone());
        Ok(renewed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockBrokerClient;

    fn credentials() -> LoginCredentials {
        LoginCredentials {
            api_key: "k".into(),
            api_secret: "s".into(),
            dealer_client_id: None,
            request_token: None,
        }
    }

    #[tokio::test]
    async fn login_then_session_for_returns_a_live_token() {
        let client: Arc<dyn BrokerClient> = MockBrokerClient::arc(BrokerKind::XtsPro);
        let manager = SessionManager::new(vec![client]);
        let user = UserId::from("u1");

        manager.login(user.clone(), BrokerKind::XtsPro, credentials()).await.unwrap();
        let session = manager.session_for(user, BrokerKind::XtsPro).await.unwrap();
        assert_eq!(session.broker_kind, BrokerKind::XtsPro);
    }

    #[tokio::test]
    async fn session_for_without_prior_login_is_an_auth_error() {
        let client: Arc<dyn BrokerClient> = MockBrokerClient::arc(BrokerKind::Zerodha);
        let manager = SessionManager::new(vec![client]);

        let err = manager
            .session_for(UserId::from("u1"), BrokerKind::Zerodha)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayErrorKind::Auth { .. }));
    }

    #[tokio::test]
    async fn logout_invalidates_the_stored_session() {
        let client: Arc<dyn BrokerClient> = MockBrokerClient::arc(BrokerKind::XtsPro);
        let manager = SessionManager::new(vec![client]);
        let user = UserId::from("u1");

        manager.login(user.clone(), BrokerKind::XtsPro, credentials()).await.unwrap();
        manager.logout(user.clone(), BrokerKind::XtsPro).await.unwrap();

        let err = manager.session_for(user, BrokerKind::XtsPro).await.unwrap_err();
        assert!(matches!(err, GatewayErrorKind::Auth { .. }));
    }
}
