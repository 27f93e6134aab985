use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::embeddings::config::OllamaEmbeddingConfig;
use crate::embeddings::error::EmbeddingError;
use crate::embeddings::types::{finalize_embeddings, EmbeddingProvider, EmbeddingProviderKind};

pub struct OllamaEmbeddingProvider {
    base_url: String,
    model: String,
    timeout_ms: u64,
    client: reqwest::Client,
    normalize_l2: bool,
    last_dims: RwLock<Option<usize>>,
}

impl OllamaEmbeddingProvider {
    pub fn new(config: OllamaEmbeddingConfig, normalize_l2: bool) -> Result<Self, EmbeddingError> {
        let model = config.model.trim();
        let base_url = config.base_url.trim().trim_end_matches('/');
        if model.is_empty() {
            return Err(EmbeddingError::Config("ollama model cannot be empty".to_string()));
        }
        if base_url.is_empty() {
            return Err(EmbeddingError::Config("ollama base_url cannot be empty".to_string()));
        }
        if config.timeout_ms == 0 {
            return Err(EmbeddingError::Config(
                "ollama timeout must be greater than 0".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|error| EmbeddingError::Runtime(error.to_string()))?;

        Ok(Self {
            base_url: base_url.to_string(),
            model: model.to_string(),
            timeout_ms: config.timeout_ms,
            client,
            normalize_l2,
            last_dims: RwLock::new(None),
        })
    }

    /// POST `body` to `path` and return the parsed JSON. Non-2xx responses
    /// become `Request` errors carrying the status code.
    async fn post_json<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<serde_json::Value, EmbeddingError> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(|error| self.map_connectivity_error(error))?;

        let status = response.status();
        let payload: serde_json::Value = response.json().await.map_err(|error| {
            EmbeddingError::InvalidResponse(format!("ollama {path} returned non-JSON body: {error}"))
        })?;

        if !status.is_success() {
            return Err(EmbeddingError::Request(format!(
                "ollama {path} returned status {}: {payload}",
                status.as_u16()
            )));
        }
        Ok(payload)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let payload = self
            .post_json(
                "/api/embed",
                &BatchRequest {
                    model: &self.model,
                    input: texts,
                },
            )
            .await?;

        let embeddings = payload
            .get("embeddings")
            .and_then(serde_json::Value::as_array)
            .ok_or_else(|| {
                EmbeddingError::InvalidResponse(
                    "ollama /api/embed response has no 'embeddings' array".to_string(),
                )
            })?;
        if embeddings.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "ollama /api/embed returned {} embeddings for {} inputs",
                embeddings.len(),
                texts.len()
            )));
        }

        embeddings
            .iter()
            .enumerate()
            .map(|(index, value)| parse_vector(value, index))
            .collect()
    }

    /// Older Ollama builds only expose the single-prompt endpoint.
    async fn embed_one_by_one(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for (index, text) in texts.iter().enumerate() {
            let payload = self
                .post_json(
                    "/api/embeddings",
                    &PromptRequest {
                        model: &self.model,
                        prompt: text,
                    },
                )
                .await?;
            let embedding = payload.get("embedding").ok_or_else(|| {
                EmbeddingError::InvalidResponse(
                    "ollama /api/embeddings response has no 'embedding' field".to_string(),
                )
            })?;
            vectors.push(parse_vector(embedding, index)?);
        }
        Ok(vectors)
    }

    fn map_connectivity_error(&self, error: reqwest::Error) -> EmbeddingError {
        if error.is_connect() {
            return EmbeddingError::Request(format!(
                "could not reach Ollama at {}: {error}",
                self.base_url
            ));
        }
        if error.is_timeout() {
            return EmbeddingError::Timeout(format!(
                "Ollama request timed out after {} ms",
                self.timeout_ms
            ));
        }
        EmbeddingError::Request(error.to_string())
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    fn id(&self) -> &str {
        "ollama"
    }

    fn kind(&self) -> EmbeddingProviderKind {
        EmbeddingProviderKind::Remote
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let raw = match self.embed_batch(texts).await {
            Err(EmbeddingError::Request(message)) if message.contains("status 404") => {
                tracing::debug!("ollama /api/embed missing, falling back to /api/embeddings");
                self.embed_one_by_one(texts).await?
            }
            other => other?,
        };
        let vectors = finalize_embeddings(raw, self.normalize_l2)?;

        if let Some(dims) = vectors.first().map(Vec::len) {
            let mut last = self.last_dims.write().await;
            if last.is_some_and(|previous| previous != dims) {
                tracing::warn!(dims, "ollama embedding dimensions changed between calls");
            }
            *last = Some(dims);
        }
        Ok(vectors)
    }
}

fn parse_vector(value: &serde_json::Value, index: usize) -> Result<Vec<f32>, EmbeddingError> {
    let numbers = value.as_array().ok_or_else(|| {
        EmbeddingError::InvalidResponse(format!("ollama embedding {index} is not an array"))
    })?;

    numbers
        .iter()
        .map(|number| {
            number.as_f64().map(|n| n as f32).ok_or_else(|| {
                EmbeddingError::InvalidResponse(format!(
                    "ollama embedding {index} contains a non-numeric value"
                ))
            })
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Serialize)]
struct PromptRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}
