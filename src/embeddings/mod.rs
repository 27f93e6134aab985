pub mod config;
pub mod error;
pub mod factory;
pub mod providers;
pub mod types;

pub use config::{EmbeddingConfig, EmbeddingProviderId, HashingEmbeddingConfig, OllamaEmbeddingConfig};
pub use error::EmbeddingError;
pub use factory::create_provider;
pub use types::{mean_embedding, EmbeddingProvider, EmbeddingProviderKind};
