//! Client-side status polling for resources that are still being ingested.
//!
//! ## Structure
//!
//! - `task`: `ResourcePoller`, the poll loop and its `PollerHandle`
//! - `cache`: `ResourceListCache`, invalidated when a poll reaches a terminal state
//!
//! The poller only talks to the seams below. It does not know about HTTP
//! beyond the `StatusSource` impl for `ApiClient`, and it does not know how
//! list pages are cached.

mod cache;
mod task;


use async_trait::async_trait;

use crate::api::{ApiClient, ApiError};
use crate::resources::ResourceStatusSnapshot;

pub use cache::ResourceListCache;
pub use task::{PollerHandle, ResourcePoller, DEFAULT_POLL_INTERVAL};

/// Message reported when a resource failed without a stored reason.
pub const DEFAULT_FAILURE_MESSAGE: &str = "ingestion failed";

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("resource no longer exists: {0}")]
    NotFound(String),
    #[error("status request for {id} failed: {source}")]
    Request {
        id: String,
        #[source]
        source: ApiError,
    },
}

#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, id: &str) -> Result<ResourceStatusSnapshot, ApiError>;
}

#[async_trait]
impl StatusSource for ApiClient {
    async fn fetch_status(&self, id: &str) -> Result<ResourceStatusSnapshot, ApiError> {
        self.get_resource_status(id).await
    }
}

/// Callbacks for a poll run. All default to no-ops.
pub trait PollObserver: Send + Sync {
    /// Every snapshot received, terminal or not.
    fn on_status(&self, _snapshot: &ResourceStatusSnapshot) {}

    fn on_completed(&self, _snapshot: &ResourceStatusSnapshot) {}

    fn on_failed(&self, _snapshot: &ResourceStatusSnapshot, _message: &str) {}

    fn on_error(&self, _error: &PollError) {}
}

impl PollObserver for () {}

/// Runs once when a poll reaches `completed` or `failed`.
pub trait TerminalStateHook: Send + Sync {
    fn on_terminal(&self, snapshot: &ResourceStatusSnapshot);
}

impl TerminalStateHook for () {
    fn on_terminal(&self, _snapshot: &ResourceStatusSnapshot) {}
}
