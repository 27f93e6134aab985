//! Neo Alexandria backend library.
//!
//! Stores resources (URLs or inline text), ingests them in the background
//! into text plus an embedding, and groups them into collections whose
//! embedding tracks their members. A client side (`api`, `poller`) talks to
//! the HTTP surface and follows ingestion until it finishes.
//!
//! # Architecture
//!
//! - `db`: SQLite storage and migrations
//! - `bus`: synchronous in-process event bus
//! - `resources`: resource records and the ingestion state machine
//! - `collections`: collections, membership and aggregate embeddings
//! - `embeddings`: embedding providers (local hashing, Ollama)
//! - `ingestion`: background fetch, extract and embed worker
//! - `server`: axum routes
//! - `api`: HTTP client with retry and token refresh
//! - `poller`: status polling and list-cache invalidation
//! - `config`: environment-driven settings

pub mod api;
pub mod bus;
pub mod collections;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod ingestion;
pub mod poller;
pub mod resources;
pub mod server;

use std::sync::Arc;
use std::time::Duration;

use bus::EventBus;
use collections::CollectionService;
use config::{AppConfig, ConfigError};
use db::{Database, DbError};
use embeddings::EmbeddingError;
use ingestion::{HttpContentFetcher, IngestionError, IngestionHandle, IngestionPipeline};
use resources::{IngestionStatus, ResourceError, ResourceListQuery, ResourceService};
use server::ServiceState;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_LOG_FILTER: &str = "neo_alexandria_lib=debug,neo_alexandria=debug,info";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    Ingestion(#[from] IngestionError),
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Install the fmt subscriber. `RUST_LOG` wins over the built-in filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();
}

/// Wire storage, bus, services and the ingestion worker, then serve HTTP
/// until shutdown.
pub async fn run(config: AppConfig) -> Result<(), AppError> {
    let db = if config.is_in_memory() {
        Database::open_in_memory()?
    } else {
        Database::open(&config.db_path)?
    };
    let db = Arc::new(db);
    let bus = Arc::new(EventBus::new());

    let resources = Arc::new(ResourceService::new(db.clone(), bus.clone()));
    let collections = Arc::new(CollectionService::new(db));
    collections::register_handlers(&bus, collections.clone());

    let embedder = embeddings::create_provider(&config.embedding)?;
    let fetcher = Arc::new(HttpContentFetcher::new(FETCH_TIMEOUT)?);
    let ingestion = IngestionPipeline::start(resources.clone(), fetcher, embedder);
    let requeued = requeue_unfinished(&resources, &ingestion)?;
    if requeued > 0 {
        tracing::info!(requeued, "resumed unfinished ingestion");
    }

    tracing::info!(db = %config.db_path, "Neo Alexandria started");
    server::serve(
        config.bind,
        ServiceState {
            resources,
            collections,
            ingestion,
        },
    )
    .await?;
    Ok(())
}

/// Queue every resource a previous process left `pending` or `processing`.
fn requeue_unfinished(
    resources: &ResourceService,
    ingestion: &IngestionHandle,
) -> Result<usize, AppError> {
    let mut ids = Vec::new();
    for status in [IngestionStatus::Pending, IngestionStatus::Processing] {
        let mut query = ResourceListQuery {
            status: Some(status),
            limit: resources::MAX_PAGE_LIMIT,
            ..ResourceListQuery::default()
        };
        loop {
            let page = resources.list(&query)?;
            let fetched = page.items.len();
            ids.extend(page.items.into_iter().map(|resource| resource.id));
            if fetched < query.limit as usize {
                break;
            }
            query.offset += query.limit;
        }
    }
    for id in &ids {
        ingestion.enqueue(id.clone())?;
    }
    Ok(ids.len())
}
