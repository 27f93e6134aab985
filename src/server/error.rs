use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::collections::CollectionError;
use crate::ingestion::IngestionError;
use crate::resources::ResourceError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {self}");
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

impl From<ResourceError> for ServerError {
    fn from(value: ResourceError) -> Self {
        match value {
            ResourceError::NotFound(_) => Self::NotFound(value.to_string()),
            ResourceError::Invalid(_) | ResourceError::InvalidTransition { .. } => {
                Self::BadRequest(value.to_string())
            }
            ResourceError::Db(_) => Self::Internal(value.to_string()),
        }
    }
}

impl From<CollectionError> for ServerError {
    fn from(value: CollectionError) -> Self {
        match value {
            CollectionError::NotFound(_)
            | CollectionError::ResourceNotFound(_)
            | CollectionError::NotAMember { .. } => Self::NotFound(value.to_string()),
            CollectionError::Invalid(_) => Self::BadRequest(value.to_string()),
            CollectionError::Db(_) => Self::Internal(value.to_string()),
        }
    }
}

impl From<IngestionError> for ServerError {
    fn from(value: IngestionError) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<JsonRejection> for ServerError {
    fn from(value: JsonRejection) -> Self {
        Self::BadRequest(value.body_text())
    }
}

impl From<QueryRejection> for ServerError {
    fn from(value: QueryRejection) -> Self {
        Self::BadRequest(value.body_text())
    }
}
