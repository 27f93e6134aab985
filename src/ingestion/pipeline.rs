use std::sync::Arc;

use tokio::sync::mpsc;

use crate::embeddings::{EmbeddingError, EmbeddingProvider};
use crate::resources::{CompletedIngestion, Resource, ResourceService, UNTITLED};

use super::{ContentFetcher, IngestionError};

/// Embedding input is cut to this many characters; the stored content is not.
const MAX_EMBED_CHARS: usize = 8_000;

pub struct IngestionPipeline {
    resources: Arc<ResourceService>,
    fetcher: Arc<dyn ContentFetcher>,
    embedder: Arc<dyn EmbeddingProvider>,
}

/// Queue side of a running pipeline. Cheap to clone; the worker exits once
/// every handle is dropped.
#[derive(Clone)]
pub struct IngestionHandle {
    tx: mpsc::UnboundedSender<String>,
}

impl IngestionHandle {
    pub fn enqueue(&self, id: impl Into<String>) -> Result<(), IngestionError> {
        self.tx
            .send(id.into())
            .map_err(|_| IngestionError::WorkerStopped)
    }
}

impl IngestionPipeline {
    pub fn new(
        resources: Arc<ResourceService>,
        fetcher: Arc<dyn ContentFetcher>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            resources,
            fetcher,
            embedder,
        }
    }

    /// Spawn the worker and return the handle that feeds it.
    pub fn start(
        resources: Arc<ResourceService>,
        fetcher: Arc<dyn ContentFetcher>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> IngestionHandle {
        let pipeline = Self::new(resources, fetcher, embedder);
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            tracing::info!(
                embedder = pipeline.embedder.id(),
                kind = ?pipeline.embedder.kind(),
                "ingestion worker started"
            );
            while let Some(id) = rx.recv().await {
                if let Err(error) = pipeline.ingest(&id).await {
                    tracing::warn!(resource_id = %id, "ingestion did not complete: {error}");
                }
            }
            tracing::info!("ingestion worker stopped");
        });
        IngestionHandle { tx }
    }

    /// Drive one resource from `pending` to a terminal state.
    ///
    /// A resource that cannot enter `processing` (deleted, or already
    /// terminal) is left untouched. Any later error is recorded through
    /// `mark_failed` and returned.
    pub async fn ingest(&self, id: &str) -> Result<Resource, IngestionError> {
        let resource = self.resources.mark_processing(id)?;
        tracing::debug!(resource_id = id, "ingestion started");

        match self.extract_and_embed(&resource).await {
            Ok(outcome) => {
                let completed = self.resources.mark_completed(id, outcome)?;
                tracing::info!(resource_id = id, "ingestion completed");
                Ok(completed)
            }
            Err(error) => {
                self.resources.mark_failed(id, &error.to_string())?;
                Err(error)
            }
        }
    }

    async fn extract_and_embed(
        &self,
        resource: &Resource,
    ) -> Result<CompletedIngestion, IngestionError> {
        let inline = resource
            .content
            .as_deref()
            .map(str::trim)
            .filter(|content| !content.is_empty());

        let (text, fetched_title) = match (inline, resource.url.as_deref()) {
            (Some(content), _) => (content.to_string(), None),
            (None, Some(url)) => {
                let fetched = self.fetcher.fetch(url).await?;
                (fetched.text, fetched.title)
            }
            (None, None) => return Err(IngestionError::EmptyContent(resource.id.clone())),
        };
        if text.trim().is_empty() {
            return Err(IngestionError::EmptyContent(resource.id.clone()));
        }

        let input: String = text.chars().take(MAX_EMBED_CHARS).collect();
        let embedding = self
            .embedder
            .embed(&[input])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                EmbeddingError::InvalidResponse("provider returned no vectors".to_string())
            })?;

        // A fetched <title> only replaces the placeholder title derived at creation.
        let title = fetched_title.filter(|_| has_placeholder_title(resource));

        Ok(CompletedIngestion {
            title,
            content: Some(text),
            embedding: Some(embedding),
        })
    }
}

fn has_placeholder_title(resource: &Resource) -> bool {
    resource.url.as_deref() == Some(resource.title.as_str()) || resource.title == UNTITLED
}
