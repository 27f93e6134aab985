use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::bus::event_types::{
    ResourceCompleted, ResourceDeleted, RESOURCE_COMPLETED, RESOURCE_DELETED,
};
use crate::bus::EventBus;
use crate::db::queries::{self, ResourceListFilter, ResourceRow};
use crate::db::{Database, DbError};

use super::types::{
    CreateResource, IngestionStatus, Resource, ResourceListQuery, ResourcePage,
    ResourceStatusSnapshot, SortDir,
};

/// Title given to a resource created without a title or URL.
pub const UNTITLED: &str = "Untitled";

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("resource {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: IngestionStatus,
        to: IngestionStatus,
    },
    #[error("invalid resource: {0}")]
    Invalid(String),
    #[error(transparent)]
    Db(#[from] DbError),
}

/// Fields the ingestion pipeline fills in when a resource completes.
#[derive(Debug, Clone, Default)]
pub struct CompletedIngestion {
    pub title: Option<String>,
    pub content: Option<String>,
    pub embedding: Option<Vec<f32>>,
}

pub struct ResourceService {
    db: Arc<Database>,
    bus: Arc<EventBus>,
}

impl ResourceService {
    pub fn new(db: Arc<Database>, bus: Arc<EventBus>) -> Self {
        Self { db, bus }
    }

    pub fn create(&self, request: CreateResource) -> Result<Resource, ResourceError> {
        let url = non_empty(request.url);
        let content = non_empty(request.content);
        if url.is_none() && content.is_none() {
            return Err(ResourceError::Invalid(
                "either url or content is required".to_string(),
            ));
        }
        let title = non_empty(request.title)
            .or_else(|| url.clone())
            .unwrap_or_else(|| UNTITLED.to_string());

        let now = Utc::now().to_rfc3339();
        let row = ResourceRow {
            id: Uuid::new_v4().to_string(),
            title,
            url,
            content,
            ingestion_status: IngestionStatus::Pending.as_str().to_string(),
            ingestion_error: None,
            ingestion_started_at: None,
            ingestion_completed_at: None,
            embedding_json: None,
            created_at: now.clone(),
            updated_at: now,
        };
        queries::insert_resource(&self.db, &row)?;
        tracing::info!(resource_id = %row.id, "resource created");
        resource_from_row(row)
    }

    pub fn get(&self, id: &str) -> Result<Resource, ResourceError> {
        let row = queries::get_resource(&self.db, id)?
            .ok_or_else(|| ResourceError::NotFound(id.to_string()))?;
        resource_from_row(row)
    }

    pub fn status(&self, id: &str) -> Result<ResourceStatusSnapshot, ResourceError> {
        Ok(self.get(id)?.status_snapshot())
    }

    pub fn list(&self, query: &ResourceListQuery) -> Result<ResourcePage, ResourceError> {
        let limit = query.effective_limit();
        let status = query.status.map(|status| status.as_str());
        let filter = ResourceListFilter {
            status,
            title_contains: query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()),
            sort_column: query.sort_by.column(),
            descending: query.sort_dir == SortDir::Desc,
            offset: i64::from(query.offset),
            limit: i64::from(limit),
        };
        let (rows, total) = queries::list_resources(&self.db, &filter)?;
        let items = rows
            .into_iter()
            .map(resource_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ResourcePage {
            items,
            total: u64::try_from(total).unwrap_or_default(),
            offset: query.offset,
            limit,
        })
    }

    pub fn mark_processing(&self, id: &str) -> Result<Resource, ResourceError> {
        self.transition(id, IngestionStatus::Processing, |row, now| {
            row.ingestion_started_at = Some(now.to_string());
        })
    }

    pub fn mark_completed(
        &self,
        id: &str,
        outcome: CompletedIngestion,
    ) -> Result<Resource, ResourceError> {
        let embedding_json = outcome
            .embedding
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|error| ResourceError::Invalid(format!("unserializable embedding: {error}")))?;

        let completed = self.transition(id, IngestionStatus::Completed, move |row, now| {
            if let Some(title) = non_empty(outcome.title) {
                row.title = title;
            }
            if outcome.content.is_some() {
                row.content = outcome.content;
            }
            if embedding_json.is_some() {
                row.embedding_json = embedding_json;
            }
            row.ingestion_error = None;
            row.ingestion_started_at.get_or_insert_with(|| now.to_string());
            row.ingestion_completed_at = Some(now.to_string());
        })?;

        let report = self.bus.emit(
            RESOURCE_COMPLETED,
            &ResourceCompleted {
                resource_id: completed.id.clone(),
            },
        );
        if report.failed > 0 {
            tracing::warn!(
                resource_id = %completed.id,
                failed = report.failed,
                "some resource.completed handlers failed"
            );
        }
        Ok(completed)
    }

    pub fn mark_failed(&self, id: &str, error: &str) -> Result<Resource, ResourceError> {
        let message = error.trim().to_string();
        self.transition(id, IngestionStatus::Failed, move |row, now| {
            row.ingestion_error = Some(message);
            row.ingestion_started_at.get_or_insert_with(|| now.to_string());
            row.ingestion_completed_at = Some(now.to_string());
        })
    }

    /// Delete a resource, then publish `resource.deleted` once the delete has
    /// committed. Handler failures are logged by the bus and never undo the
    /// delete.
    pub fn delete(&self, id: &str) -> Result<Resource, ResourceError> {
        let row = queries::delete_resource(&self.db, id)?
            .ok_or_else(|| ResourceError::NotFound(id.to_string()))?;
        let deleted = resource_from_row(row)?;
        tracing::info!(resource_id = %deleted.id, "resource deleted");

        let report = self.bus.emit(
            RESOURCE_DELETED,
            &ResourceDeleted {
                resource_id: deleted.id.clone(),
                title: deleted.title.clone(),
            },
        );
        if report.failed > 0 {
            tracing::warn!(
                resource_id = %deleted.id,
                failed = report.failed,
                "some resource.deleted handlers failed"
            );
        }
        Ok(deleted)
    }

    fn transition<F>(
        &self,
        id: &str,
        next: IngestionStatus,
        apply: F,
    ) -> Result<Resource, ResourceError>
    where
        F: FnOnce(&mut ResourceRow, &str),
    {
        let mut row = queries::get_resource(&self.db, id)?
            .ok_or_else(|| ResourceError::NotFound(id.to_string()))?;
        let current = parse_status(&row)?;

        if current == next && !current.is_terminal() {
            return resource_from_row(row);
        }
        if !current.can_transition_to(next) {
            return Err(ResourceError::InvalidTransition {
                id: id.to_string(),
                from: current,
                to: next,
            });
        }

        let now = Utc::now().to_rfc3339();
        apply(&mut row, &now);
        row.ingestion_status = next.as_str().to_string();
        row.updated_at = now;

        if !queries::update_resource(&self.db, &row)? {
            return Err(ResourceError::NotFound(id.to_string()));
        }
        tracing::debug!(resource_id = %id, from = %current, to = %next, "ingestion status changed");
        resource_from_row(row)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_status(row: &ResourceRow) -> Result<IngestionStatus, ResourceError> {
    row.ingestion_status
        .parse()
        .map_err(|error: String| DbError::Corrupt(format!("resource {}: {error}", row.id)).into())
}

pub(crate) fn resource_from_row(row: ResourceRow) -> Result<Resource, ResourceError> {
    let ingestion_status = parse_status(&row)?;
    let embedding = row
        .embedding_json
        .as_deref()
        .map(serde_json::from_str::<Vec<f32>>)
        .transpose()
        .map_err(|error| DbError::Corrupt(format!("resource {} embedding: {error}", row.id)))?;

    Ok(Resource {
        id: row.id,
        title: row.title,
        url: row.url,
        content: row.content,
        ingestion_status,
        ingestion_error: row.ingestion_error,
        ingestion_started_at: row.ingestion_started_at,
        ingestion_completed_at: row.ingestion_completed_at,
        embedding,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}
