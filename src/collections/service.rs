use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::db::queries::{self, CollectionRow};
use crate::db::{Database, DbError};
use crate::embeddings::mean_embedding;
use crate::resources::{resource_from_row, Resource, ResourceError};

#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("collection not found: {0}")]
    NotFound(String),
    #[error("resource not found: {0}")]
    ResourceNotFound(String),
    #[error("resource {resource_id} is not in collection {collection_id}")]
    NotAMember {
        collection_id: String,
        resource_id: String,
    },
    #[error("invalid collection: {0}")]
    Invalid(String),
    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<ResourceError> for CollectionError {
    fn from(value: ResourceError) -> Self {
        match value {
            ResourceError::NotFound(id) => Self::ResourceNotFound(id),
            ResourceError::Db(error) => Self::Db(error),
            other => Self::Invalid(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateCollection {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

pub struct CollectionService {
    db: Arc<Database>,
}

impl CollectionService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn create(&self, request: CreateCollection) -> Result<Collection, CollectionError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(CollectionError::Invalid("name cannot be empty".to_string()));
        }
        let now = Utc::now().to_rfc3339();
        let row = CollectionRow {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: request
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            embedding_json: None,
            created_at: now.clone(),
            updated_at: now,
        };
        queries::insert_collection(&self.db, &row)?;
        collection_from_row(row)
    }

    pub fn get(&self, id: &str) -> Result<Collection, CollectionError> {
        let row = queries::get_collection(&self.db, id)?
            .ok_or_else(|| CollectionError::NotFound(id.to_string()))?;
        collection_from_row(row)
    }

    pub fn list(&self) -> Result<Vec<Collection>, CollectionError> {
        queries::list_collections(&self.db)?
            .into_iter()
            .map(collection_from_row)
            .collect()
    }

    pub fn members(&self, collection_id: &str) -> Result<Vec<Resource>, CollectionError> {
        self.get(collection_id)?;
        let rows = queries::list_collection_resources(&self.db, collection_id)?;
        let members = rows
            .into_iter()
            .map(resource_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(members)
    }

    pub fn add_resource(
        &self,
        collection_id: &str,
        resource_id: &str,
    ) -> Result<Collection, CollectionError> {
        self.get(collection_id)?;
        if queries::get_resource(&self.db, resource_id)?.is_none() {
            return Err(CollectionError::ResourceNotFound(resource_id.to_string()));
        }
        let added = queries::insert_collection_member(
            &self.db,
            collection_id,
            resource_id,
            &Utc::now().to_rfc3339(),
        )?;
        if added {
            self.recompute_embedding(collection_id)?;
        }
        self.get(collection_id)
    }

    pub fn remove_resource(
        &self,
        collection_id: &str,
        resource_id: &str,
    ) -> Result<Collection, CollectionError> {
        self.get(collection_id)?;
        if !queries::delete_collection_member(&self.db, collection_id, resource_id)? {
            return Err(CollectionError::NotAMember {
                collection_id: collection_id.to_string(),
                resource_id: resource_id.to_string(),
            });
        }
        self.recompute_embedding(collection_id)?;
        self.get(collection_id)
    }

    /// Recompute and store the embedding from the members that currently
    /// have one. Clears it when none do.
    pub fn recompute_embedding(
        &self,
        collection_id: &str,
    ) -> Result<Option<Vec<f32>>, CollectionError> {
        let members = self.members(collection_id)?;
        let embedding = mean_embedding(
            members
                .iter()
                .filter_map(|member| member.embedding.as_deref()),
        );

        let embedding_json = embedding
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|error| CollectionError::Invalid(error.to_string()))?;
        let updated = queries::update_collection_embedding(
            &self.db,
            collection_id,
            embedding_json.as_deref(),
            &Utc::now().to_rfc3339(),
        )?;
        if !updated {
            return Err(CollectionError::NotFound(collection_id.to_string()));
        }
        tracing::debug!(
            collection_id,
            members = members.len(),
            has_embedding = embedding.is_some(),
            "collection embedding recomputed"
        );
        Ok(embedding)
    }

    /// Recompute every collection holding a resource whose embedding just
    /// changed. Returns the affected collection ids.
    pub fn handle_resource_completed(
        &self,
        resource_id: &str,
    ) -> Result<Vec<String>, CollectionError> {
        let affected = queries::list_collections_referencing(&self.db, resource_id)?;
        self.recompute_all(&affected)?;
        Ok(affected)
    }

    /// Drop every membership of a deleted resource and recompute each
    /// affected collection once. Returns the affected collection ids.
    pub fn handle_resource_deleted(
        &self,
        resource_id: &str,
    ) -> Result<Vec<String>, CollectionError> {
        let affected = queries::list_collections_referencing(&self.db, resource_id)?;
        if affected.is_empty() {
            return Ok(affected);
        }
        queries::delete_memberships_for_resource(&self.db, resource_id)?;
        self.recompute_all(&affected)?;
        Ok(affected)
    }

    /// Recompute each collection once, carrying on past individual failures.
    fn recompute_all(&self, collection_ids: &[String]) -> Result<(), CollectionError> {
        let mut failures = Vec::new();
        for collection_id in collection_ids {
            if let Err(error) = self.recompute_embedding(collection_id) {
                tracing::warn!(collection_id = %collection_id, "embedding recompute failed: {error}");
                failures.push(format!("{collection_id}: {error}"));
            }
        }
        if !failures.is_empty() {
            return Err(CollectionError::Invalid(format!(
                "recompute failed for {}",
                failures.join("; ")
            )));
        }
        Ok(())
    }
}

fn collection_from_row(row: CollectionRow) -> Result<Collection, CollectionError> {
    let embedding = row
        .embedding_json
        .as_deref()
        .map(serde_json::from_str::<Vec<f32>>)
        .transpose()
        .map_err(|error| DbError::Corrupt(format!("collection {} embedding: {error}", row.id)))?;

    Ok(Collection {
        id: row.id,
        name: row.name,
        description: row.description,
        embedding,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}
