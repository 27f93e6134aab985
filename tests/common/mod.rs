//! Shared fixtures for the integration tests: a live HTTP server on an
//! ephemeral port, backed by an in-memory database.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use neo_alexandria_lib::api::{ApiClient, ApiClientConfig, AuthSession, RetryPolicy};
use neo_alexandria_lib::bus::EventBus;
use neo_alexandria_lib::collections::{register_handlers, CollectionService};
use neo_alexandria_lib::db::Database;
use neo_alexandria_lib::embeddings::providers::HashingEmbeddingProvider;
use neo_alexandria_lib::embeddings::HashingEmbeddingConfig;
use neo_alexandria_lib::ingestion::{HttpContentFetcher, IngestionPipeline};
use neo_alexandria_lib::poller::{PollError, PollObserver};
use neo_alexandria_lib::resources::{ResourceService, ResourceStatusSnapshot};
use neo_alexandria_lib::server::{app, ServiceState};

pub const DIMS: usize = 32;

pub struct TestServer {
    pub base_url: String,
    pub state: ServiceState,
    task: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let db = Arc::new(Database::open_in_memory().expect("in-memory DB"));
        let bus = Arc::new(EventBus::new());
        let resources = Arc::new(ResourceService::new(db.clone(), bus.clone()));
        let collections = Arc::new(CollectionService::new(db));
        register_handlers(&bus, collections.clone());

        let embedder = HashingEmbeddingProvider::new(HashingEmbeddingConfig { dims: DIMS }, true)
            .expect("hashing provider");
        let fetcher = HttpContentFetcher::new(Duration::from_secs(5)).expect("fetcher");
        let ingestion =
            IngestionPipeline::start(resources.clone(), Arc::new(fetcher), Arc::new(embedder));

        let state = ServiceState {
            resources,
            collections,
            ingestion,
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");
        let router = app(state.clone());
        let task = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router).await {
                panic!("test server failed: {err}");
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
            task,
        }
    }

    /// Client with retries disabled so a failing request surfaces at once.
    pub fn client(&self) -> ApiClient {
        let config = ApiClientConfig {
            retry: RetryPolicy::none(),
            ..ApiClientConfig::new(self.base_url.clone())
        };
        ApiClient::new(config, Arc::new(AuthSession::anonymous())).expect("api client")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Default)]
pub struct Transcript {
    events: Mutex<Vec<String>>,
}

impl Transcript {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl PollObserver for Transcript {
    fn on_status(&self, snapshot: &ResourceStatusSnapshot) {
        self.push(snapshot.ingestion_status.to_string());
    }

    fn on_completed(&self, _snapshot: &ResourceStatusSnapshot) {
        self.push("on_completed".to_string());
    }

    fn on_failed(&self, _snapshot: &ResourceStatusSnapshot, message: &str) {
        self.push(format!("on_failed: {message}"));
    }

    fn on_error(&self, error: &PollError) {
        self.push(format!("on_error: {error}"));
    }
}
