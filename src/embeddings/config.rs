use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingProviderId {
    Hashing,
    Ollama,
}

impl EmbeddingProviderId {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hashing => "hashing",
            Self::Ollama => "ollama",
        }
    }
}

impl std::fmt::Display for EmbeddingProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EmbeddingProviderId {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hashing" | "hash" | "local" => Ok(Self::Hashing),
            "ollama" => Ok(Self::Ollama),
            _ => Err(format!("unsupported embedding provider: {value}")),
        }
    }
}

impl Default for EmbeddingProviderId {
    fn default() -> Self {
        Self::Hashing
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashingEmbeddingConfig {
    #[serde(default = "default_hashing_dims")]
    pub dims: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaEmbeddingConfig {
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,
    #[serde(default = "default_ollama_embedding_model")]
    pub model: String,
    #[serde(default = "default_remote_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProviderId,
    #[serde(default = "default_normalize_l2")]
    pub normalize_l2: bool,
    #[serde(default)]
    pub hashing: HashingEmbeddingConfig,
    #[serde(default)]
    pub ollama: OllamaEmbeddingConfig,
}

impl Default for HashingEmbeddingConfig {
    fn default() -> Self {
        Self {
            dims: default_hashing_dims(),
        }
    }
}

impl Default for OllamaEmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_embedding_model(),
            timeout_ms: default_remote_timeout_ms(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderId::default(),
            normalize_l2: default_normalize_l2(),
            hashing: HashingEmbeddingConfig::default(),
            ollama: OllamaEmbeddingConfig::default(),
        }
    }
}

fn default_hashing_dims() -> usize {
    256
}

fn default_normalize_l2() -> bool {
    true
}

fn default_ollama_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_ollama_base_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_remote_timeout_ms() -> u64 {
    30_000
}
