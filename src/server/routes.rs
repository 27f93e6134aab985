use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::collections::{Collection, CreateCollection};
use crate::resources::{
    CreateResource, CreateResourceResponse, Resource, ResourceListQuery, ResourcePage,
    ResourceStatusSnapshot,
};

use super::{ServerError, ServiceState};

#[derive(Debug, Serialize)]
pub(super) struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Deserialize)]
pub(super) struct AddMemberRequest {
    resource_id: String,
}

/// Run synchronous storage work that may fan out into embedding recomputes
/// on the blocking pool.
async fn blocking<T, E, F>(work: F) -> Result<T, ServerError>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ServerError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|error| ServerError::Internal(format!("blocking task failed: {error}")))?
        .map_err(Into::into)
}

pub(super) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Record the resource as `pending` and hand it to the ingestion worker.
pub(super) async fn create_resource(
    State(state): State<ServiceState>,
    body: Result<Json<CreateResource>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateResourceResponse>), ServerError> {
    let Json(request) = body?;
    let resource = state.resources.create(request)?;

    if let Err(error) = state.ingestion.enqueue(resource.id.clone()) {
        state.resources.mark_failed(&resource.id, &error.to_string())?;
        return Err(error.into());
    }
    tracing::info!(resource_id = %resource.id, "resource accepted for ingestion");

    Ok((
        StatusCode::CREATED,
        Json(CreateResourceResponse {
            id: resource.id,
            message: "ingestion queued".to_string(),
        }),
    ))
}

pub(super) async fn list_resources(
    State(state): State<ServiceState>,
    query: Result<Query<ResourceListQuery>, QueryRejection>,
) -> Result<Json<ResourcePage>, ServerError> {
    let Query(query) = query?;
    Ok(Json(state.resources.list(&query)?))
}

pub(super) async fn get_resource(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
) -> Result<Json<Resource>, ServerError> {
    Ok(Json(state.resources.get(&id)?))
}

pub(super) async fn resource_status(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
) -> Result<Json<ResourceStatusSnapshot>, ServerError> {
    Ok(Json(state.resources.status(&id)?))
}

pub(super) async fn delete_resource(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServerError> {
    let resources = state.resources.clone();
    blocking(move || resources.delete(&id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn create_collection(
    State(state): State<ServiceState>,
    body: Result<Json<CreateCollection>, JsonRejection>,
) -> Result<(StatusCode, Json<Collection>), ServerError> {
    let Json(request) = body?;
    let collection = state.collections.create(request)?;
    Ok((StatusCode::CREATED, Json(collection)))
}

pub(super) async fn list_collections(
    State(state): State<ServiceState>,
) -> Result<Json<Vec<Collection>>, ServerError> {
    Ok(Json(state.collections.list()?))
}

pub(super) async fn get_collection(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
) -> Result<Json<Collection>, ServerError> {
    Ok(Json(state.collections.get(&id)?))
}

pub(super) async fn collection_members(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Resource>>, ServerError> {
    Ok(Json(state.collections.members(&id)?))
}

pub(super) async fn add_collection_resource(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
    body: Result<Json<AddMemberRequest>, JsonRejection>,
) -> Result<Json<Collection>, ServerError> {
    let Json(request) = body?;
    let collections = state.collections.clone();
    let collection =
        blocking(move || collections.add_resource(&id, &request.resource_id)).await?;
    Ok(Json(collection))
}

pub(super) async fn remove_collection_resource(
    State(state): State<ServiceState>,
    Path((id, resource_id)): Path<(String, String)>,
) -> Result<Json<Collection>, ServerError> {
    let collections = state.collections.clone();
    let collection = blocking(move || collections.remove_resource(&id, &resource_id)).await?;
    Ok(Json(collection))
}
