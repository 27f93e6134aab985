use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::resources::{
    CreateResource, CreateResourceResponse, Resource, ResourceListQuery, ResourcePage,
    ResourceStatusSnapshot,
};

use super::auth::AuthSession;
use super::error::ApiError;
use super::retry::RetryPolicy;

const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiClientConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
}

impl ApiClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: default_timeout_ms(),
            retry: RetryPolicy::default(),
            refresh_path: default_refresh_path(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    15_000
}

fn default_refresh_path() -> String {
    DEFAULT_REFRESH_PATH.to_string()
}

#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    refresh_url: String,
    http: reqwest::Client,
    session: Arc<AuthSession>,
    retry: RetryPolicy,
}

impl ApiClient {
    pub fn new(config: ApiClientConfig, session: Arc<AuthSession>) -> Result<Self, ApiError> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ApiError::Config("api base_url cannot be empty".to_string()));
        }
        if config.timeout_ms == 0 {
            return Err(ApiError::Config(
                "api timeout must be greater than 0".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|error| ApiError::Config(error.to_string()))?;

        Ok(Self {
            refresh_url: format!("{base_url}{}", config.refresh_path),
            base_url,
            http,
            session,
            retry: config.retry,
        })
    }

    pub fn session(&self) -> &Arc<AuthSession> {
        &self.session
    }

    pub async fn get_resource_status(&self, id: &str) -> Result<ResourceStatusSnapshot, ApiError> {
        let path = format!("/resources/{}/status", urlencoding::encode(id));
        self.json(Method::GET, &path, |req| req).await
    }

    pub async fn get_resource(&self, id: &str) -> Result<Resource, ApiError> {
        let path = format!("/resources/{}", urlencoding::encode(id));
        self.json(Method::GET, &path, |req| req).await
    }

    pub async fn list_resources(&self, query: &ResourceListQuery) -> Result<ResourcePage, ApiError> {
        self.json(Method::GET, "/resources", |req| req.query(query))
            .await
    }

    pub async fn create_resource(
        &self,
        request: &CreateResource,
    ) -> Result<CreateResourceResponse, ApiError> {
        self.json(Method::POST, "/resources", |req| req.json(request))
            .await
    }

    pub async fn delete_resource(&self, id: &str) -> Result<(), ApiError> {
        let path = format!("/resources/{}", urlencoding::encode(id));
        self.execute(Method::DELETE, &path, |req| req)
            .await?;
        Ok(())
    }

    async fn json<T, F>(
        &self,
        method: Method,
        path: &str,
        build: F,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let response = self.execute(method, path, build).await?;
        response
            .json::<T>()
            .await
            .map_err(|error| ApiError::InvalidResponse(format!("{path}: {error}")))
    }

    /// Send a request with the session's bearer token.
    ///
    /// - transient failures (network, timeout, 5xx) are retried per the
    ///   configured `RetryPolicy`
    /// - a 401 triggers one token refresh and one replay
    /// - 404, 429 and other 4xx are returned immediately
    async fn execute<F>(
        &self,
        method: Method,
        path: &str,
        build: F,
    ) -> Result<reqwest::Response, ApiError>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let url = format!("{}{path}", self.base_url);
        let retry = self.retry;
        let mut retries = 0u32;
        let mut refreshed = false;

        loop {
            let token = self.session.access_token();
            let mut request = build(self.http.request(method.clone(), &url));
            if let Some(token) = &token {
                request = request.bearer_auth(token);
            }

            let error = match request.send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) if response.status() == StatusCode::UNAUTHORIZED && !refreshed => {
                    refreshed = true;
                    tracing::debug!(%method, path, "401 received, refreshing session");
                    self.session
                        .refresh(&self.http, &self.refresh_url, token.as_deref())
                        .await?;
                    continue;
                }
                Ok(response) => ApiError::from_response(response).await,
                Err(error) => ApiError::from(error),
            };

            if !error.is_retryable() || retries >= retry.max_retries {
                if error.is_retryable() {
                    tracing::warn!(%method, path, retries, "giving up after retries: {error}");
                }
                return Err(error);
            }

            let delay = retry.delay_for(retries);
            retries += 1;
            tracing::warn!(
                %method,
                path,
                attempt = retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "transient API failure, retrying: {error}"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
