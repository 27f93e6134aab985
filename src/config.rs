//! Process configuration, read from `NEO_ALEXANDRIA_*` environment variables
//! (and a `.env` file when present).

use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::{ApiClientConfig, AuthTokens};
use crate::embeddings::{EmbeddingConfig, EmbeddingProviderId};
use crate::poller::DEFAULT_POLL_INTERVAL;

const ENV_PREFIX: &str = "NEO_ALEXANDRIA_";

/// Database path that selects an in-memory SQLite database.
pub const IN_MEMORY_DB: &str = ":memory:";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    #[serde(default = "default_api")]
    pub api: ApiClientConfig,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            bind: default_bind(),
            api: default_api(),
            api_token: None,
            refresh_token: None,
            poll_interval_ms: default_poll_interval_ms(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

fn default_db_path() -> String {
    "neo_alexandria.db".to_string()
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8000))
}

fn default_api() -> ApiClientConfig {
    ApiClientConfig::new("http://127.0.0.1:8000")
}

fn default_poll_interval_ms() -> u64 {
    u64::try_from(DEFAULT_POLL_INTERVAL.as_millis()).unwrap_or(2_000)
}

impl AppConfig {
    /// Load `.env` if there is one, then apply environment overrides on top
    /// of the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(error) if error.not_found() => {}
            Err(error) => tracing::warn!("ignoring unreadable .env file: {error}"),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. Keys are the full variable names,
    /// e.g. `NEO_ALEXANDRIA_BIND`. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();

        if let Some(path) = get("DB_PATH") {
            config.db_path = path;
        }
        if let Some(bind) = parse(&get, "BIND")? {
            config.bind = bind;
        }
        if let Some(base_url) = get("API_BASE_URL") {
            config.api.base_url = base_url;
        }
        config.api_token = get("API_TOKEN");
        config.refresh_token = get("REFRESH_TOKEN");
        if let Some(interval) = parse(&get, "POLL_INTERVAL_MS")? {
            config.poll_interval_ms = positive("POLL_INTERVAL_MS", interval)?;
        }
        if let Some(max_retries) = parse(&get, "MAX_RETRIES")? {
            config.api.retry.max_retries = max_retries;
        }
        if let Some(ms) = parse(&get, "RETRY_BASE_DELAY_MS")? {
            config.api.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse(&get, "RETRY_MAX_DELAY_MS")? {
            config.api.retry.max_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse(&get, "REQUEST_TIMEOUT_MS")? {
            config.api.timeout_ms = positive("REQUEST_TIMEOUT_MS", ms)?;
        }
        if let Some(provider) = parse::<EmbeddingProviderId, _>(&get, "EMBEDDING_PROVIDER")? {
            config.embedding.provider = provider;
        }
        if let Some(dims) = parse::<usize, _>(&get, "EMBEDDING_DIMS")? {
            if dims == 0 {
                return Err(invalid("EMBEDDING_DIMS", "must be greater than 0"));
            }
            config.embedding.hashing.dims = dims;
        }
        if let Some(base_url) = get("OLLAMA_BASE_URL") {
            config.embedding.ollama.base_url = base_url;
        }
        if let Some(model) = get("OLLAMA_MODEL") {
            config.embedding.ollama.model = model;
        }

        if config.api.retry.base_delay > config.api.retry.max_delay {
            return Err(invalid(
                "RETRY_BASE_DELAY_MS",
                "must not exceed RETRY_MAX_DELAY_MS",
            ));
        }
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn auth_tokens(&self) -> Option<AuthTokens> {
        self.api_token.clone().map(|access_token| AuthTokens {
            access_token,
            refresh_token: self.refresh_token.clone(),
        })
    }

    pub fn is_in_memory(&self) -> bool {
        self.db_path == IN_MEMORY_DB
    }
}

fn parse<T, G>(get: &G, name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    G: Fn(&str) -> Option<String>,
{
    get(name)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|error| invalid(name, format!("{raw:?}: {error}")))
        })
        .transpose()
}

fn positive(name: &str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(invalid(name, "must be greater than 0"));
    }
    Ok(value)
}

fn invalid(name: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key: format!("{ENV_PREFIX}{name}"),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (format!("{ENV_PREFIX}{k}"), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_without_variables() {
        let config = load(&[]).unwrap();
        assert_eq!(config.db_path, "neo_alexandria.db");
        assert_eq!(config.bind, "127.0.0.1:8000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.poll_interval(), Duration::from_millis(2_000));
        assert_eq!(config.api.retry.max_retries, 3);
        assert_eq!(config.api.retry.base_delay, Duration::from_millis(1_000));
        assert_eq!(config.api.retry.max_delay, Duration::from_millis(30_000));
        assert_eq!(config.embedding.provider, EmbeddingProviderId::Hashing);
        assert!(config.auth_tokens().is_none());
        assert!(!config.is_in_memory());
    }

    #[test]
    fn variables_override_defaults() {
        let config = load(&[
            ("DB_PATH", ":memory:"),
            ("BIND", "0.0.0.0:9100"),
            ("API_BASE_URL", "https://library.example.org"),
            ("API_TOKEN", "tok"),
            ("REFRESH_TOKEN", "ref"),
            ("POLL_INTERVAL_MS", "500"),
            ("MAX_RETRIES", "5"),
            ("RETRY_BASE_DELAY_MS", "250"),
            ("RETRY_MAX_DELAY_MS", "4000"),
            ("REQUEST_TIMEOUT_MS", "9000"),
            ("EMBEDDING_PROVIDER", "ollama"),
            ("EMBEDDING_DIMS", "64"),
            ("OLLAMA_BASE_URL", "http://gpu-box:11434"),
            ("OLLAMA_MODEL", "mxbai-embed-large"),
        ])
        .unwrap();

        assert!(config.is_in_memory());
        assert_eq!(config.bind.port(), 9100);
        assert_eq!(config.api.base_url, "https://library.example.org");
        assert_eq!(
            config.auth_tokens(),
            Some(AuthTokens {
                access_token: "tok".to_string(),
                refresh_token: Some("ref".to_string()),
            })
        );
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.api.retry.max_retries, 5);
        assert_eq!(config.api.retry.delay_for(1), Duration::from_millis(500));
        assert_eq!(config.api.timeout_ms, 9_000);
        assert_eq!(config.embedding.provider, EmbeddingProviderId::Ollama);
        assert_eq!(config.embedding.hashing.dims, 64);
        assert_eq!(config.embedding.ollama.base_url, "http://gpu-box:11434");
        assert_eq!(config.embedding.ollama.model, "mxbai-embed-large");
    }

    #[test]
    fn blank_values_are_ignored() {
        let config = load(&[("API_TOKEN", "   "), ("DB_PATH", "")]).unwrap();
        assert!(config.auth_tokens().is_none());
        assert_eq!(config.db_path, "neo_alexandria.db");
    }

    #[test]
    fn bad_values_name_the_variable() {
        let cases: &[(&str, &str)] = &[
            ("BIND", "not-an-addr"),
            ("MAX_RETRIES", "-1"),
            ("POLL_INTERVAL_MS", "0"),
            ("EMBEDDING_PROVIDER", "openai"),
            ("EMBEDDING_DIMS", "0"),
        ];
        for &(name, value) in cases {
            let error = load(&[(name, value)]).unwrap_err();
            let ConfigError::Invalid { key, .. } = error;
            assert_eq!(key, format!("NEO_ALEXANDRIA_{name}"));
        }

        let error = load(&[("RETRY_BASE_DELAY_MS", "60000")]).unwrap_err();
        assert!(error.to_string().contains("RETRY_MAX_DELAY_MS"));
    }
}
