use std::sync::Arc;
use std::time::Duration;

use crate::{AuthError, CredentialVerifier, Session, SessionStore};

/// Issues, checks and revokes sessions.
#[derive(Clone)]
pub struct SessionGate {
    verifier: Arc<dyn CredentialVerifier>,
    store: Arc<dyn SessionStore>,
    ttl: Duration,
}

impl SessionGate {
    pub fn new(
        verifier: Arc<dyn CredentialVerifier>,
        store: Arc<dyn SessionStore>,
        ttl: Duration,
    ) -> Self {
        Self {
            verifier,
            store,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Verify credentials and open a new session.
    #[tracing::instrument(skip(self, secret))]
    pub async fn sign_in(&self, username: &str, secret: &str) -> Result<Session, AuthError> {
        let identity = match self.verifier.verify(username, secret).await {
            Ok(identity) => identity,
            Err(e) => {
                tracing::info!(error = %e, "sign-in rejected");
                return Err(e);
            }
        };

        let session = Session::mint(identity.username, self.ttl);
        self.store.insert(&session, self.ttl).await?;
        tracing::info!(username = %session.username, "session opened");
        Ok(session)
    }

    /// Revoke the session behind `token`. Signing out without a session is not an error.
    pub async fn sign_out(&self, token: Option<&str>) -> Result<(), AuthError> {
        let Some(token) = token else {
            return Ok(());
        };
        self.store.remove(token).await?;
        tracing::debug!("session closed");
        Ok(())
    }

    /// Resolve `token` to a live session.
    pub async fn require_session(&self, token: Option<&str>) -> Result<Session, AuthError> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingSession)?;
        self.store
            .get(token)
            .await?
            .ok_or(AuthError::SessionExpired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{hash_secret, Argon2Credentials, MemorySessionStore};

    fn gate(ttl: Duration) -> SessionGate {
        let credentials = Argon2Credentials::new()
            .unwrap()
            .with_user("admin", hash_secret("password").unwrap());
        SessionGate::new(
            Arc::new(credentials),
            Arc::new(MemorySessionStore::new()),
            ttl,
        )
    }

    #[tokio::test]
    async fn sign_in_then_require_then_sign_out() {
        let gate = gate(Duration::from_secs(60));

        let session = gate.sign_in("admin", "password").await.unwrap();
        assert_eq!(session.username, "admin");

        let resolved = gate.require_session(Some(&session.token)).await.unwrap();
        assert_eq!(resolved, session);

        gate.sign_out(Some(&session.token)).await.unwrap();
        assert!(matches!(
            gate.require_session(Some(&session.token)).await,
            Err(AuthError::SessionExpired)
        ));
    }

    #[tokio::test]
    async fn bad_credentials_open_no_session() {
        let gate = gate(Duration::from_secs(60));
        assert!(matches!(
            gate.sign_in("admin", "wrong").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            gate.sign_in("nobody", "password").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn missing_or_unknown_tokens_are_rejected() {
        let gate = gate(Duration::from_secs(60));
        assert!(matches!(
            gate.require_session(None).await,
            Err(AuthError::MissingSession)
        ));
        assert!(matches!(
            gate.require_session(Some("")).await,
            Err(AuthError::MissingSession)
        ));
        assert!(matches!(
            gate.require_session(Some("deadbeef")).await,
            Err(AuthError::SessionExpired)
        ));
    }

    #[tokio::test]
    async fn sign_out_without_session_is_ok() {
        let gate = gate(Duration::from_secs(60));
        gate.sign_out(None).await.unwrap();
        gate.sign_out(Some("never-issued")).await.unwrap();
    }

    #[tokio::test]
    async fn sessions_expire_after_ttl() {
        let gate = gate(Duration::from_millis(20));
        let session = gate.sign_in("admin", "password").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(gate.require_session(Some(&session.token)).await.is_err());
    }
}
