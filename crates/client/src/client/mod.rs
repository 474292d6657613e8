//! HTTP client for the track API.

pub mod lists;
pub mod tasks;

use serde::Deserialize;
use tracing::debug;

use crate::auth::{AuthTokens, TokenStore};
use crate::error::{error_from_body, ClientError, Result};

/// HTTP client for the track API.
///
/// Clones share the same connection pool and token state.
#[derive(Debug, Clone)]
pub struct TrackClient {
    client: reqwest::Client,
    base_url: String,
    tokens: TokenStore,
}

#[derive(Debug, Deserialize)]
struct AccessToken {
    access: String,
}

impl TrackClient {
    /// Create a new client with the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            tokens: TokenStore::new(),
        }
    }

    /// Create from environment (TRACK_API_URL or default).
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("TRACK_API_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());
        Self::new(base_url)
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The shared token state.
    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Build a URL for an endpoint.
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // ---- auth -------------------------------------------------------

    /// Exchanges credentials for a token pair and installs it.
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url("/api/token/"))
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await?;
        let tokens: AuthTokens = self.parse_response(response, "session").await?;
        self.tokens.set(tokens).await;
        Ok(())
    }

    /// Drops the session tokens.
    pub async fn logout(&self) {
        self.tokens.clear().await;
    }

    /// Trades the refresh token for a new access token. Returns false
    /// when there is no refresh token to use; a rejected refresh
    /// clears the session entirely.
    async fn refresh_access(&self) -> Result<bool> {
        let Some(refresh) = self.tokens.refresh().await else {
            return Ok(false);
        };
        let response = self
            .client
            .post(self.url("/api/token/refresh/"))
            .json(&serde_json::json!({ "refresh": refresh }))
            .send()
            .await?;
        if response.status().as_u16() == 401 {
            self.tokens.clear().await;
            return Err(ClientError::Unauthorized);
        }
        let token: AccessToken = self.parse_response(response, "session").await?;
        self.tokens.set_access(token.access).await;
        debug!("access token refreshed");
        Ok(true)
    }

    // ---- plumbing ---------------------------------------------------

    /// Sends a request with the bearer token attached. A 401 response
    /// triggers one token refresh and one retry; a second 401 is
    /// returned to the caller.
    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let retry = builder.try_clone();
        let response = self.authorized(builder).await.send().await?;
        if response.status().as_u16() != 401 {
            return Ok(response);
        }
        let Some(retry) = retry else {
            return Ok(response);
        };
        if !self.refresh_access().await? {
            return Ok(response);
        }
        Ok(self.authorized(retry).await.send().await?)
    }

    async fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.tokens.access().await {
            Some(access) => builder.bearer_auth(access),
            None => builder,
        }
    }

    /// Handle error responses.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
        resource: &str,
    ) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            response.json().await.map_err(ClientError::from)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(error_from_body(status.as_u16(), resource, &body))
        }
    }

    /// Handle responses with no body expected.
    async fn parse_empty_response(
        &self,
        response: reqwest::Response,
        resource: &str,
    ) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(error_from_body(status.as_u16(), resource, &body))
        }
    }
}
