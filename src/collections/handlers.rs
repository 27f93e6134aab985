use std::sync::Arc;

use crate::bus::event_types::{
    ResourceCompleted, ResourceDeleted, RESOURCE_COMPLETED, RESOURCE_DELETED,
};
use crate::bus::{EventBus, HandlerError, SubscriptionId};

use super::service::CollectionService;

/// Subscribe the collection module to the events it reacts to.
pub fn register_handlers(bus: &EventBus, service: Arc<CollectionService>) -> Vec<SubscriptionId> {
    let deleted = {
        let service = service.clone();
        bus.subscribe(RESOURCE_DELETED, move |event| {
            let body: ResourceDeleted = event.payload_as()?;
            let affected = service
                .handle_resource_deleted(&body.resource_id)
                .map_err(|error| HandlerError::new(error.to_string()))?;
            if !affected.is_empty() {
                tracing::info!(
                    resource_id = %body.resource_id,
                    collections = affected.len(),
                    "recomputed collection embeddings after resource delete"
                );
            }
            Ok(())
        })
    };

    let completed = bus.subscribe(RESOURCE_COMPLETED, move |event| {
        let body: ResourceCompleted = event.payload_as()?;
        let affected = service
            .handle_resource_completed(&body.resource_id)
            .map_err(|error| HandlerError::new(error.to_string()))?;
        if !affected.is_empty() {
            tracing::debug!(
                resource_id = %body.resource_id,
                collections = affected.len(),
                "recomputed collection embeddings after ingestion"
            );
        }
        Ok(())
    });

    vec![deleted, completed]
}
