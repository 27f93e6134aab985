use std::sync::Arc;

use crate::embeddings::config::{EmbeddingConfig, EmbeddingProviderId};
use crate::embeddings::error::EmbeddingError;
use crate::embeddings::providers::{HashingEmbeddingProvider, OllamaEmbeddingProvider};
use crate::embeddings::types::EmbeddingProvider;

pub fn create_provider(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    let provider: Arc<dyn EmbeddingProvider> = match config.provider {
        EmbeddingProviderId::Hashing => Arc::new(HashingEmbeddingProvider::new(
            config.hashing.clone(),
            config.normalize_l2,
        )?),
        EmbeddingProviderId::Ollama => Arc::new(OllamaEmbeddingProvider::new(
            config.ollama.clone(),
            config.normalize_l2,
        )?),
    };

    tracing::info!(provider = provider.id(), "embedding provider ready");
    Ok(provider)
}
