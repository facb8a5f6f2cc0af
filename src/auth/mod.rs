//! Authentication and the signed-in session
//!
//! [`SessionContext`] is the one place that knows who the current user is.
//! It is created at startup, passed to every service that needs the user,
//! and torn down by [`SessionContext::sign_out`]. In hosted mode it owns an
//! [`AuthClient`] and keeps the shared [`BearerToken`] in sync with the
//! session; in local mode it simply holds the configured local user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::error::{JournalError, Result};
use crate::models::User;
use crate::storage::UserStore;

pub mod client;
pub mod session_store;

pub use client::AuthClient;
pub use session_store::{KeyringSessionStore, MemorySessionStore, SessionPersistence};

/// Shared handle to the current access token
///
/// Clients that call the hosted backend hold a clone and read the token on
/// every request, so a refresh or sign-out is visible to all of them.
#[derive(Debug, Clone, Default)]
pub struct BearerToken(Arc<RwLock<Option<String>>>);

impl BearerToken {
    /// Empty handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Current token, if signed in
    pub fn get(&self) -> Option<String> {
        self.0.read().ok().and_then(|t| t.clone())
    }

    /// Replace the token
    pub fn set(&self, token: Option<String>) {
        if let Ok(mut guard) = self.0.write() {
            *guard = token;
        }
    }
}

/// User object returned by the auth service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Identifier, shared with the `users` table
    pub id: Uuid,
    /// Email address
    #[serde(default)]
    pub email: Option<String>,
    /// Set once the address has been confirmed
    #[serde(default)]
    pub email_confirmed_at: Option<DateTime<Utc>>,
    /// Free-form metadata; `full_name` holds the display name
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

impl AuthUser {
    /// Whether the email address has been confirmed
    pub fn is_confirmed(&self) -> bool {
        self.email_confirmed_at.is_some()
    }

    /// Display name stored in the metadata
    pub fn full_name(&self) -> Option<String> {
        self.user_metadata
            .get("full_name")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    /// Application user built from this auth user
    pub fn to_user(&self) -> User {
        User {
            id: self.id,
            email: self.email.clone().unwrap_or_default(),
            display_name: self.full_name(),
        }
    }
}

/// Tokens for a signed-in user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    /// Bearer token for API calls
    pub access_token: String,
    /// Token used to obtain a new access token
    pub refresh_token: String,
    /// Expiry of the access token
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_seconds_option"
    )]
    pub expires_at: Option<DateTime<Utc>>,
    /// The user the tokens belong to
    pub user: AuthUser,
}

impl AuthSession {
    /// Whether the access token is expired or within a minute of expiring
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            None => false,
            Some(expires_at) => Utc::now() >= expires_at - chrono::Duration::seconds(60),
        }
    }
}

/// The signed-in user and everything needed to act on their behalf
pub struct SessionContext {
    user: RwLock<Option<User>>,
    session: RwLock<Option<AuthSession>>,
    token: BearerToken,
    auth: Option<AuthClient>,
    persistence: Arc<dyn SessionPersistence>,
}

impl SessionContext {
    /// Context for the local backend, permanently signed in as `user`
    pub fn local(user: User) -> Self {
        Self {
            user: RwLock::new(Some(user)),
            session: RwLock::new(None),
            token: BearerToken::new(),
            auth: None,
            persistence: Arc::new(MemorySessionStore::default()),
        }
    }

    /// Context for the hosted backend
    ///
    /// Nobody is signed in until [`SessionContext::init`] restores a session
    /// or one of the sign-in methods succeeds.
    pub fn hosted(auth: AuthClient, persistence: Arc<dyn SessionPersistence>) -> Self {
        let token = auth.token();
        Self {
            user: RwLock::new(None),
            session: RwLock::new(None),
            token,
            auth: Some(auth),
            persistence,
        }
    }

    /// Restore the persisted session, refreshing it when expired
    ///
    /// A session that cannot be refreshed or whose user cannot be fetched is
    /// discarded; the context then stays signed out.
    pub async fn init(&self) -> Result<Option<User>> {
        let Some(auth) = &self.auth else {
            return Ok(self.current_user());
        };

        let Some(mut session) = self.persistence.load()? else {
            tracing::debug!("No persisted session");
            return Ok(None);
        };

        if session.is_expired() {
            tracing::info!("Persisted session expired, refreshing");
            match auth.refresh_session(&session.refresh_token).await {
                Ok(refreshed) => session = refreshed,
                Err(e) => {
                    tracing::warn!("Session refresh failed: {}", e);
                    self.persistence.clear()?;
                    return Ok(None);
                }
            }
        }

        self.token.set(Some(session.access_token.clone()));
        match auth.get_user().await {
            Ok(user) => {
                session.user = user;
                self.install(session)?;
                Ok(self.current_user())
            }
            Err(e) => {
                tracing::warn!("Failed to fetch user for persisted session: {}", e);
                self.token.set(None);
                self.persistence.clear()?;
                Ok(None)
            }
        }
    }

    /// Sign in with email and password
    ///
    /// # Errors
    ///
    /// Returns `JournalError::Auth("Verify your email before signing in.")`
    /// when the address is unconfirmed; the half-open session is signed out.
    pub async fn sign_in_with_password<U: UserStore + ?Sized>(
        &self,
        email: &str,
        password: &str,
        users: &U,
    ) -> Result<User> {
        let auth = self.require_auth()?;
        let session = auth.sign_in_with_password(email, password).await?;
        self.complete_sign_in(session, users).await
    }

    /// Sign in with an identity token from a federated provider
    pub async fn sign_in_with_id_token<U: UserStore + ?Sized>(
        &self,
        provider: &str,
        id_token: &str,
        users: &U,
    ) -> Result<User> {
        let auth = self.require_auth()?;
        let session = auth.sign_in_with_id_token(provider, id_token).await?;
        self.complete_sign_in(session, users).await
    }

    /// Register a new account; the user must confirm the email before signing in
    pub async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> Result<AuthUser> {
        let auth = self.require_auth()?;
        auth.sign_up(email, password, full_name).await
    }

    /// End the session and forget the persisted tokens
    pub async fn sign_out(&self) -> Result<()> {
        if let Some(auth) = &self.auth {
            if self.token.get().is_some() {
                if let Err(e) = auth.sign_out().await {
                    tracing::warn!("Remote sign-out failed: {}", e);
                }
            }
            self.persistence.clear()?;
            self.token.set(None);
            if let Ok(mut guard) = self.session.write() {
                *guard = None;
            }
            if let Ok(mut guard) = self.user.write() {
                *guard = None;
            }
            tracing::info!("Signed out");
        }
        Ok(())
    }

    /// The signed-in user, if any
    pub fn current_user(&self) -> Option<User> {
        self.user.read().ok().and_then(|u| u.clone())
    }

    /// The signed-in user
    ///
    /// # Errors
    ///
    /// Returns `JournalError::NotAuthenticated` when nobody is signed in.
    pub fn require_user(&self) -> Result<User> {
        self.current_user().ok_or_else(|| {
            JournalError::NotAuthenticated("sign in with `journal auth login`".to_string()).into()
        })
    }

    /// Identifier of the signed-in user
    pub fn user_id(&self) -> Result<Uuid> {
        Ok(self.require_user()?.id)
    }

    /// Shared bearer token handle
    pub fn token(&self) -> BearerToken {
        self.token.clone()
    }

    /// Current auth session (hosted mode only)
    pub fn session(&self) -> Option<AuthSession> {
        self.session.read().ok().and_then(|s| s.clone())
    }

    /// Auth client, present in hosted mode
    pub fn auth_client(&self) -> Option<&AuthClient> {
        self.auth.as_ref()
    }

    /// Whether this context talks to the hosted auth service
    pub fn is_hosted(&self) -> bool {
        self.auth.is_some()
    }

    /// Update the cached display name of the signed-in user
    pub fn set_display_name(&self, name: &str) {
        if let Ok(mut guard) = self.user.write() {
            if let Some(user) = guard.as_mut() {
                user.display_name = Some(name.to_string());
            }
        }
    }

    fn require_auth(&self) -> Result<&AuthClient> {
        self.auth.as_ref().ok_or_else(|| {
            JournalError::Config("Authentication requires the supabase backend".to_string()).into()
        })
    }

    async fn complete_sign_in<U: UserStore + ?Sized>(
        &self,
        session: AuthSession,
        users: &U,
    ) -> Result<User> {
        if !session.user.is_confirmed() {
            tracing::warn!("Sign-in rejected: email not confirmed");
            if let Some(auth) = &self.auth {
                if let Err(e) = auth.sign_out_token(&session.access_token).await {
                    tracing::debug!("Sign-out of unconfirmed session failed: {}", e);
                }
            }
            return Err(
                JournalError::Auth("Verify your email before signing in.".to_string()).into(),
            );
        }

        self.install(session)?;
        let user = self.require_user()?;
        users.upsert_user(&user).await?;
        tracing::info!("Signed in as {}", user.email);
        Ok(user)
    }

    fn install(&self, session: AuthSession) -> Result<()> {
        self.persistence.save(&session)?;
        self.token.set(Some(session.access_token.clone()));
        if let Ok(mut guard) = self.user.write() {
            *guard = Some(session.user.to_user());
        }
        if let Ok(mut guard) = self.session.write() {
            *guard = Some(session);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::new_id;
    use serde_json::json;

    fn auth_user(confirmed: bool) -> AuthUser {
        AuthUser {
            id: new_id(),
            email: Some("sam@example.com".to_string()),
            email_confirmed_at: confirmed.then(Utc::now),
            user_metadata: json!({ "full_name": "Sam" }),
        }
    }

    #[test]
    fn test_bearer_token_is_shared() {
        let token = BearerToken::new();
        let clone = token.clone();
        token.set(Some("abc".to_string()));
        assert_eq!(clone.get().as_deref(), Some("abc"));
        clone.set(None);
        assert!(token.get().is_none());
    }

    #[test]
    fn test_auth_user_to_user() {
        let user = auth_user(true).to_user();
        assert_eq!(user.email, "sam@example.com");
        assert_eq!(user.display_name.as_deref(), Some("Sam"));
    }

    #[test]
    fn test_session_expiry_buffer() {
        let mut session = AuthSession {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_at: Some(Utc::now() + chrono::Duration::seconds(30)),
            user: auth_user(true),
        };
        assert!(session.is_expired());
        session.expires_at = Some(Utc::now() + chrono::Duration::hours(1));
        assert!(!session.is_expired());
        session.expires_at = None;
        assert!(!session.is_expired());
    }

    #[tokio::test]
    async fn test_local_context_is_signed_in() {
        let user = auth_user(true).to_user();
        let ctx = SessionContext::local(user.clone());
        assert_eq!(ctx.init().await.unwrap(), Some(user.clone()));
        assert_eq!(ctx.user_id().unwrap(), user.id);
        assert!(!ctx.is_hosted());

        ctx.set_display_name("Sammy");
        assert_eq!(
            ctx.current_user().unwrap().display_name.as_deref(),
            Some("Sammy")
        );
    }

    #[test]
    fn test_require_user_when_signed_out() {
        let auth = AuthClient::new("http://localhost:1", "anon", 5).unwrap();
        let ctx = SessionContext::hosted(auth, Arc::new(MemorySessionStore::default()));
        let err = ctx.require_user().unwrap_err();
        assert!(matches!(
            crate::error::kind_of(&err),
            Some(JournalError::NotAuthenticated(_))
        ));
    }
}
