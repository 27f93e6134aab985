//! Background ingestion: fetch, extract text, embed, and finish the resource.
//!
//! `POST /resources` only records a `pending` row and enqueues its id. One
//! worker task drains the queue and walks each resource through
//! `processing` to `completed` or `failed`.

mod fetcher;
mod pipeline;


use async_trait::async_trait;
use thiserror::Error;

use crate::embeddings::EmbeddingError;
use crate::resources::ResourceError;

pub use fetcher::{extract_title, html_to_text, HttpContentFetcher};
pub use pipeline::{IngestionHandle, IngestionPipeline};

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("fetching {url} failed: {message}")]
    Fetch { url: String, message: String },
    #[error("resource {0} has no text to ingest")]
    EmptyContent(String),
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error("ingestion worker is not running")]
    WorkerStopped,
}

/// Text pulled out of a remote document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedContent {
    pub title: Option<String>,
    pub text: String,
}

#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedContent, IngestionError>;
}
