use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::error::ApiError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Notified when a refresh fails and local auth state has been cleared.
/// A UI sends the user back to the login screen from here.
pub trait AuthListener: Send + Sync {
    fn on_session_expired(&self);
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

pub struct AuthSession {
    tokens: RwLock<Option<AuthTokens>>,
    refresh_lock: Mutex<()>,
    listener: Option<Arc<dyn AuthListener>>,
}

impl AuthSession {
    pub fn new(tokens: Option<AuthTokens>) -> Self {
        Self {
            tokens: RwLock::new(tokens),
            refresh_lock: Mutex::new(()),
            listener: None,
        }
    }

    pub fn anonymous() -> Self {
        Self::new(None)
    }

    pub fn with_listener(mut self, listener: Arc<dyn AuthListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().as_ref().map(|t| t.access_token.clone())
    }

    pub fn tokens(&self) -> Option<AuthTokens> {
        self.read().clone()
    }

    pub fn set_tokens(&self, tokens: AuthTokens) {
        *self
            .tokens
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(tokens);
    }

    /// Clear all local auth state and tell the listener.
    pub fn expire(&self) {
        self.tokens
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        tracing::warn!("auth session expired; local tokens cleared");
        if let Some(listener) = &self.listener {
            listener.on_session_expired();
        }
    }

    /// Exchange the refresh token for a new access token. `stale` is the
    /// access token the failed request carried; if another caller already
    /// replaced it, this returns without a second refresh. If another
    /// caller's refresh failed and cleared it, this reports the expiry
    /// without notifying the listener again.
    pub(super) async fn refresh(
        &self,
        http: &reqwest::Client,
        refresh_url: &str,
        stale: Option<&str>,
    ) -> Result<(), ApiError> {
        let _guard = self.refresh_lock.lock().await;

        let current = self.tokens();
        match (&current, stale) {
            (Some(current), _) if stale != Some(current.access_token.as_str()) => return Ok(()),
            (None, Some(_)) => return Err(ApiError::SessionExpired),
            _ => {}
        }
        let Some(refresh_token) = current.and_then(|t| t.refresh_token) else {
            self.expire();
            return Err(ApiError::SessionExpired);
        };

        match self.request_refresh(http, refresh_url, &refresh_token).await {
            Ok(response) => {
                tracing::debug!("access token refreshed");
                self.set_tokens(AuthTokens {
                    access_token: response.access_token,
                    refresh_token: response.refresh_token.or(Some(refresh_token)),
                });
                Ok(())
            }
            Err(error) => {
                tracing::warn!("token refresh failed: {error}");
                self.expire();
                Err(ApiError::SessionExpired)
            }
        }
    }

    async fn request_refresh(
        &self,
        http: &reqwest::Client,
        refresh_url: &str,
        refresh_token: &str,
    ) -> Result<RefreshResponse, ApiError> {
        let response = http
            .post(refresh_url)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ApiError::from_response(response).await);
        }
        Ok(response.json::<RefreshResponse>().await?)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Option<AuthTokens>> {
        self.tokens
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
