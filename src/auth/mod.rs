//! Authentication state
//!
//! The [`AuthContext`] answers "who is the authenticated actor" for every
//! operation and owns the session-expiry side effect: when the network
//! rejects the credential as expired, the stored session is dropped and the
//! user has to log in again.

mod store;

pub use store::*;

use anyhow::Result;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

use crate::bsky::{AuthSession, BskyError};

pub struct AuthContext {
    session: RwLock<Option<AuthSession>>,
    store: Arc<dyn CredentialStore>,
}

impl AuthContext {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            session: RwLock::new(None),
            store,
        }
    }

    /// Load a previously persisted session, if any
    pub async fn restore(&self) -> Result<Option<AuthSession>> {
        let session = self.store.load().await?;
        if let Some(session) = &session {
            debug!("Restored session for {}", session.handle);
        }
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session.clone();
        Ok(session)
    }

    pub async fn login(&self, session: AuthSession) -> Result<()> {
        self.store.save(&session).await?;
        info!("Logged in as {} ({})", session.handle, session.did);
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
        Ok(())
    }

    pub async fn logout(&self) -> Result<()> {
        self.forget();
        self.store.clear().await?;
        info!("Logged out");
        Ok(())
    }

    /// Drop the session after the network reported the credential as expired
    pub async fn handle_session_expired(&self) {
        warn!("Session expired, please login again");
        self.forget();
        if let Err(e) = self.store.clear().await {
            warn!("Failed to clear stored credentials: {}", e);
        }
    }

    /// Run the session-expiry side effect when `error` is an expired credential
    pub async fn check_expired(&self, error: &BskyError) {
        if error.is_expired_token() {
            self.handle_session_expired().await;
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.read().is_some()
    }

    /// DID of the authenticated actor
    pub fn actor_id(&self) -> Option<String> {
        self.read().as_ref().map(|session| session.did.clone())
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().as_ref().map(|session| session.access_jwt.clone())
    }

    pub fn session(&self) -> Option<AuthSession> {
        self.read().clone()
    }

    fn forget(&self) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Option<AuthSession>> {
        self.session.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> AuthSession {
        AuthSession {
            did: "did:plc:me".to_string(),
            handle: "me.bsky.social".to_string(),
            access_jwt: "access".to_string(),
            refresh_jwt: "refresh".to_string(),
        }
    }

    #[tokio::test]
    async fn test_login_and_logout() {
        let store = Arc::new(MemoryCredentialStore::default());
        let auth = AuthContext::new(store.clone());
        assert!(!auth.is_logged_in());
        assert_eq!(auth.actor_id(), None);

        auth.login(session()).await.unwrap();
        assert_eq!(auth.actor_id().as_deref(), Some("did:plc:me"));
        assert_eq!(auth.access_token().as_deref(), Some("access"));
        assert_eq!(store.load().await.unwrap(), Some(session()));

        auth.logout().await.unwrap();
        assert!(!auth.is_logged_in());
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_restore_from_store() {
        let store = Arc::new(MemoryCredentialStore::default());
        store.save(&session()).await.unwrap();

        let auth = AuthContext::new(store);
        assert!(!auth.is_logged_in());

        let restored = auth.restore().await.unwrap();
        assert_eq!(restored, Some(session()));
        assert!(auth.is_logged_in());
    }

    #[tokio::test]
    async fn test_session_expiry_clears_everything() {
        let store = Arc::new(MemoryCredentialStore::default());
        let auth = AuthContext::new(store.clone());
        auth.login(session()).await.unwrap();

        auth.check_expired(&BskyError::RateLimitError("busy".to_string())).await;
        assert!(auth.is_logged_in());

        auth.check_expired(&BskyError::ExpiredToken).await;

        assert!(!auth.is_logged_in());
        assert!(store.load().await.unwrap().is_none());
    }
}
