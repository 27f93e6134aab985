//! JSON HTTP surface over the resource and collection services.

mod error;
mod routes;

#[cfg(test)]
mod tests;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::collections::CollectionService;
use crate::ingestion::IngestionHandle;
use crate::resources::ResourceService;

pub use error::ServerError;

#[derive(Clone)]
pub struct ServiceState {
    pub resources: Arc<ResourceService>,
    pub collections: Arc<CollectionService>,
    pub ingestion: IngestionHandle,
}

pub fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route(
            "/resources",
            post(routes::create_resource).get(routes::list_resources),
        )
        .route(
            "/resources/:id",
            get(routes::get_resource).delete(routes::delete_resource),
        )
        .route("/resources/:id/status", get(routes::resource_status))
        .route(
            "/collections",
            post(routes::create_collection).get(routes::list_collections),
        )
        .route("/collections/:id", get(routes::get_collection))
        .route(
            "/collections/:id/resources",
            post(routes::add_collection_resource).get(routes::collection_members),
        )
        .route(
            "/collections/:id/resources/:resource_id",
            delete(routes::remove_collection_resource),
        )
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(addr: SocketAddr, state: ServiceState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "HTTP server listening");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {error}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
