mod hashing;
mod ollama;

pub use hashing::HashingEmbeddingProvider;
pub use ollama::OllamaEmbeddingProvider;
