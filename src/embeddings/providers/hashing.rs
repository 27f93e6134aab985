use sha2::{Digest, Sha256};

use crate::embeddings::config::HashingEmbeddingConfig;
use crate::embeddings::error::EmbeddingError;
use crate::embeddings::types::{finalize_embeddings, EmbeddingProvider, EmbeddingProviderKind};

/// Deterministic feature-hashed bag-of-words embeddings. Needs no model and
/// no network, so it is the default provider.
pub struct HashingEmbeddingProvider {
    dims: usize,
    normalize_l2: bool,
}

impl HashingEmbeddingProvider {
    pub fn new(config: HashingEmbeddingConfig, normalize_l2: bool) -> Result<Self, EmbeddingError> {
        if config.dims == 0 {
            return Err(EmbeddingError::Config(
                "hashing dims must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            dims: config.dims,
            normalize_l2,
        })
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        vector
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

#[async_trait::async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    fn id(&self) -> &str {
        "hashing"
    }

    fn kind(&self) -> EmbeddingProviderKind {
        EmbeddingProviderKind::Local
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if let Some(idx) = texts.iter().position(|text| tokenize(text).next().is_none()) {
            return Err(EmbeddingError::InvalidResponse(format!(
                "text at index {idx} has no tokens to embed"
            )));
        }
        let vectors = texts.iter().map(|text| self.embed_one(text)).collect();
        finalize_embeddings(vectors, self.normalize_l2)
    }
}
