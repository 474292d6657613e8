//! Token-based session state.
//!
//! The API issues a short-lived access token and a longer-lived
//! refresh token. [`TokenStore`] shares both between the client's
//! clones; [`crate::TrackClient`] attaches the access token to every
//! request and retries once after a refresh when it expires.

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::RwLock;

/// An access/refresh token pair as issued by the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthTokens {
    pub access: String,
    pub refresh: String,
}

/// Shared, mutable token state. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    inner: Arc<RwLock<Option<AuthTokens>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a token pair after login.
    pub async fn set(&self, tokens: AuthTokens) {
        *self.inner.write().await = Some(tokens);
    }

    /// Replaces just the access token after a refresh.
    pub async fn set_access(&self, access: String) {
        if let Some(tokens) = self.inner.write().await.as_mut() {
            tokens.access = access;
        }
    }

    /// Drops both tokens, e.g. on logout or failed refresh.
    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }

    pub async fn access(&self) -> Option<String> {
        self.inner.read().await.as_ref().map(|t| t.access.clone())
    }

    pub async fn refresh(&self) -> Option<String> {
        self.inner.read().await.as_ref().map(|t| t.refresh.clone())
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.read().await.is_some()
    }
}
