//! Client for the hosted auth REST API

use chrono::{TimeZone, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{AuthSession, AuthUser, BearerToken};
use crate::error::{JournalError, Result};

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self) -> AuthSession {
        let expires_at = match (self.expires_at, self.expires_in) {
            (Some(at), _) => Utc.timestamp_opt(at, 0).single(),
            (None, Some(secs)) => Some(Utc::now() + chrono::Duration::seconds(secs)),
            (None, None) => None,
        };
        AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

/// Sign-up returns a bare user while confirmation is pending, or a full
/// session when confirmations are disabled
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    User(AuthUser),
}

/// Auth API client
///
/// # Examples
///
/// ```
/// use voice_journal::auth::AuthClient;
///
/// let client = AuthClient::new("https://project.supabase.co", "anon-key", 30);
/// assert!(client.is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct AuthClient {
    client: Client,
    base_url: String,
    anon_key: String,
    token: BearerToken,
}

impl AuthClient {
    /// Create a client for the project at `base_url`
    pub fn new(base_url: &str, anon_key: &str, timeout_seconds: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .user_agent(concat!("voice-journal/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| JournalError::Auth(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!("Initialized auth client: url={}", base_url);

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            token: BearerToken::new(),
        })
    }

    /// Token handle updated by the session context
    pub fn token(&self) -> BearerToken {
        self.token.clone()
    }

    /// Password grant
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession> {
        tracing::debug!("Signing in with password");
        let response = self
            .request(self.client.post(self.url("/token")))
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let token: TokenResponse = Self::parse(response).await?;
        Ok(token.into_session())
    }

    /// Identity-token grant for federated sign-in
    pub async fn sign_in_with_id_token(&self, provider: &str, id_token: &str) -> Result<AuthSession> {
        tracing::debug!("Signing in with {} identity token", provider);
        let response = self
            .request(self.client.post(self.url("/token")))
            .query(&[("grant_type", "id_token")])
            .json(&json!({ "provider": provider, "id_token": id_token }))
            .send()
            .await?;
        let token: TokenResponse = Self::parse(response).await?;
        Ok(token.into_session())
    }

    /// Exchange a refresh token for a new session
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession> {
        let response = self
            .request(self.client.post(self.url("/token")))
            .query(&[("grant_type", "refresh_token")])
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        let token: TokenResponse = Self::parse(response).await?;
        Ok(token.into_session())
    }

    /// Register an account with a display name
    pub async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> Result<AuthUser> {
        let response = self
            .request(self.client.post(self.url("/signup")))
            .json(&json!({
                "email": email,
                "password": password,
                "data": { "full_name": full_name }
            }))
            .send()
            .await?;
        match Self::parse::<SignUpResponse>(response).await? {
            SignUpResponse::Session(token) => Ok(token.user),
            SignUpResponse::User(user) => Ok(user),
        }
    }

    /// The user owning the current token
    pub async fn get_user(&self) -> Result<AuthUser> {
        let response = self
            .authorized(self.client.get(self.url("/user")))?
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Merge `metadata` into the user's metadata
    pub async fn update_user_metadata(&self, metadata: serde_json::Value) -> Result<AuthUser> {
        let response = self
            .authorized(self.client.put(self.url("/user")))?
            .json(&json!({ "data": metadata }))
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Revoke the current session
    pub async fn sign_out(&self) -> Result<()> {
        let token = self
            .token
            .get()
            .ok_or_else(|| JournalError::NotAuthenticated("no active session".to_string()))?;
        self.sign_out_token(&token).await
    }

    /// Revoke the session identified by `access_token`
    pub async fn sign_out_token(&self, access_token: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url("/logout"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Send a password-reset email
    pub async fn reset_password_for_email(&self, email: &str) -> Result<()> {
        let response = self
            .request(self.client.post(self.url("/recover")))
            .json(&json!({ "email": email }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1{}", self.base_url, path)
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
    }

    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder> {
        let token = self
            .token
            .get()
            .ok_or_else(|| JournalError::NotAuthenticated("no active session".to_string()))?;
        Ok(builder.header("apikey", &self.anon_key).bearer_auth(token))
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::error!("Auth service returned error {}: {}", status, body);
        Err(auth_error(status, &body).into())
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
        let response = Self::check(response).await?;
        response.json::<T>().await.map_err(|e| {
            JournalError::Auth(format!("Failed to parse auth response: {}", e)).into()
        })
    }
}

fn auth_error(status: StatusCode, body: &str) -> JournalError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["error_description", "msg", "message", "error"]
                .iter()
                .find_map(|key| v.get(*key).and_then(|m| m.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| body.to_string());

    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::UNPROCESSABLE_ENTITY => {
            JournalError::Auth(message)
        }
        _ => JournalError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_extracts_description() {
        let err = auth_error(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
        );
        assert_eq!(err.to_string(), "Authentication error: Invalid login credentials");
    }

    #[test]
    fn test_auth_error_server_failure_is_api_error() {
        let err = auth_error(StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert!(matches!(err, JournalError::Api { status: 500, .. }));
    }

    #[test]
    fn test_token_response_expiry_from_expires_in() {
        let token: TokenResponse = serde_json::from_value(json!({
            "access_token": "a",
            "refresh_token": "r",
            "expires_in": 3600,
            "user": { "id": "8a1f9b1e-2a4e-4a65-a3c5-0d8b8d3e2f10" }
        }))
        .unwrap();
        let session = token.into_session();
        assert!(!session.is_expired());
    }
}
