//! Ingested documents and their ingestion state machine.

mod service;
mod types;

#[cfg(test)]
mod tests;

pub(crate) use service::resource_from_row;
pub use service::{CompletedIngestion, ResourceError, ResourceService, UNTITLED};
pub use types::{
    CreateResource, CreateResourceResponse, IngestionStatus, Resource, ResourceListQuery,
    ResourcePage, ResourceStatusSnapshot, SortDir, SortField, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT,
};
