use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;

use crate::bus::event_types::{
    ResourceCompleted, ResourceDeleted, RESOURCE_COMPLETED, RESOURCE_DELETED,
};
use crate::bus::{EventBus, HandlerError};
use crate::db::{queries, Database};

use super::*;

fn service() -> (ResourceService, Arc<Database>, Arc<EventBus>) {
    let db = Arc::new(Database::open_in_memory().expect("in-memory DB"));
    let bus = Arc::new(EventBus::new());
    (ResourceService::new(db.clone(), bus.clone()), db, bus)
}

fn create_url(service: &ResourceService, url: &str) -> Resource {
    service
        .create(CreateResource {
            url: Some(url.to_string()),
            ..CreateResource::default()
        })
        .expect("create resource")
}

#[test]
fn create_defaults_title_and_starts_pending() {
    let (service, _, _) = service();

    let from_url = create_url(&service, "https://example.org/paper");
    assert_eq!(from_url.title, "https://example.org/paper");
    assert_eq!(from_url.ingestion_status, IngestionStatus::Pending);
    assert!(from_url.ingestion_started_at.is_none());

    let inline = service
        .create(CreateResource {
            title: Some("  ".to_string()),
            content: Some("notes".to_string()),
            ..CreateResource::default()
        })
        .unwrap();
    assert_eq!(inline.title, "Untitled");

    let error = service.create(CreateResource::default()).unwrap_err();
    assert!(matches!(error, ResourceError::Invalid(_)));
}

#[test]
fn status_moves_forward_and_stops_at_terminal() {
    let (service, _, _) = service();
    let resource = create_url(&service, "https://example.org/a");

    let processing = service.mark_processing(&resource.id).unwrap();
    assert_eq!(processing.ingestion_status, IngestionStatus::Processing);
    let started_at = processing.ingestion_started_at.clone();
    assert!(started_at.is_some());

    // Re-entering the same non-terminal state is a no-op.
    let again = service.mark_processing(&resource.id).unwrap();
    assert_eq!(again.ingestion_started_at, started_at);

    let completed = service
        .mark_completed(
            &resource.id,
            CompletedIngestion {
                title: Some("A Paper".to_string()),
                content: Some("body".to_string()),
                embedding: Some(vec![0.6, 0.8]),
            },
        )
        .unwrap();
    assert_eq!(completed.ingestion_status, IngestionStatus::Completed);
    assert_eq!(completed.title, "A Paper");
    assert_eq!(completed.embedding, Some(vec![0.6, 0.8]));
    assert_eq!(completed.ingestion_started_at, started_at);
    assert!(completed.ingestion_completed_at.is_some());

    for attempt in [
        service.mark_processing(&resource.id),
        service.mark_failed(&resource.id, "late"),
        service.mark_completed(&resource.id, CompletedIngestion::default()),
    ] {
        assert!(matches!(
            attempt,
            Err(ResourceError::InvalidTransition {
                from: IngestionStatus::Completed,
                ..
            })
        ));
    }
}

#[test]
fn failed_resources_keep_their_error_in_the_snapshot() {
    let (service, _, _) = service();
    let resource = create_url(&service, "https://example.org/b");

    service.mark_failed(&resource.id, " fetch timed out ").unwrap();
    let snapshot = service.status(&resource.id).unwrap();
    assert_eq!(snapshot.ingestion_status, IngestionStatus::Failed);
    assert_eq!(snapshot.ingestion_error.as_deref(), Some("fetch timed out"));
    assert!(snapshot.ingestion_started_at.is_some());
    assert!(snapshot.ingestion_completed_at.is_some());
}

#[test]
fn transition_rules_cover_every_pair() {
    use IngestionStatus::*;
    let all = [Pending, Processing, Completed, Failed];
    for from in all {
        for to in all {
            let expected = matches!(
                (from, to),
                (Pending, Processing | Completed | Failed) | (Processing, Completed | Failed)
            );
            assert_eq!(from.can_transition_to(to), expected, "{from} -> {to}");
        }
    }
}

#[test]
fn list_applies_paging_sorting_and_filters() {
    let (service, _, _) = service();
    for title in ["charlie", "alpha", "bravo"] {
        service
            .create(CreateResource {
                title: Some(title.to_string()),
                content: Some("text".to_string()),
                ..CreateResource::default()
            })
            .unwrap();
    }
    let done = create_url(&service, "https://example.org/done");
    service.mark_failed(&done.id, "x").unwrap();

    let page = service
        .list(&ResourceListQuery {
            sort_by: SortField::Title,
            sort_dir: SortDir::Asc,
            status: Some(IngestionStatus::Pending),
            limit: 2,
            ..ResourceListQuery::default()
        })
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.limit, 2);
    let titles: Vec<_> = page.items.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["alpha", "bravo"]);

    let searched = service
        .list(&ResourceListQuery {
            q: Some("RAV".to_string()),
            limit: 0,
            ..ResourceListQuery::default()
        })
        .unwrap();
    assert_eq!(searched.limit, 1);
    assert_eq!(searched.items[0].title, "bravo");

    let capped = service
        .list(&ResourceListQuery {
            limit: 10_000,
            ..ResourceListQuery::default()
        })
        .unwrap();
    assert_eq!(capped.limit, MAX_PAGE_LIMIT);
    assert_eq!(capped.total, 4);
}

#[test]
fn list_query_parses_from_url_parameters() {
    let query: ResourceListQuery =
        serde_json::from_value(serde_json::json!({ "sort_by": "ingestion_status", "sort_dir": "asc" }))
            .unwrap();
    assert_eq!(query.sort_by, SortField::IngestionStatus);
    assert_eq!(query.limit, DEFAULT_PAGE_LIMIT);

    let bad = serde_json::from_value::<ResourceListQuery>(serde_json::json!({ "sort_by": "id" }));
    assert!(bad.is_err());
}

#[test]
fn delete_publishes_once_after_commit() {
    let (service, db, bus) = service();
    let resource = create_url(&service, "https://example.org/c");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handler_db = db.clone();
    bus.subscribe(RESOURCE_DELETED, move |event| {
        let body: ResourceDeleted = event.payload_as()?;
        // The row is already gone when handlers run.
        let still_there = queries::get_resource(&handler_db, &body.resource_id)
            .map_err(|e| HandlerError::new(e.to_string()))?
            .is_some();
        sink.lock().unwrap().push((body, still_there));
        Ok(())
    });

    let deleted = service.delete(&resource.id).unwrap();
    assert_eq!(deleted.id, resource.id);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(
        seen[0],
        (
            ResourceDeleted {
                resource_id: resource.id.clone(),
                title: resource.title.clone(),
            },
            false
        )
    );
    assert!(matches!(service.get(&resource.id), Err(ResourceError::NotFound(_))));
}

#[test]
fn delete_survives_failing_handlers_and_unknown_ids_publish_nothing() {
    let (service, _, bus) = service();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    bus.subscribe(RESOURCE_DELETED, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(HandlerError::new("collection update failed"))
    });

    let resource = create_url(&service, "https://example.org/d");
    assert!(service.delete(&resource.id).is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert!(matches!(
        service.delete(&resource.id),
        Err(ResourceError::NotFound(_))
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn completion_is_published_once_with_the_stored_embedding() {
    let (service, db, bus) = service();
    let done = create_url(&service, "https://example.org/e");
    let broken = create_url(&service, "https://example.org/f");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handler_db = db.clone();
    bus.subscribe(RESOURCE_COMPLETED, move |event| {
        let body: ResourceCompleted = event.payload_as()?;
        let stored = queries::get_resource(&handler_db, &body.resource_id)
            .map_err(|e| HandlerError::new(e.to_string()))?
            .and_then(|row| row.embedding_json);
        sink.lock().unwrap().push((body.resource_id, stored));
        Ok(())
    });

    service.mark_processing(&done.id).unwrap();
    service
        .mark_completed(
            &done.id,
            CompletedIngestion {
                embedding: Some(vec![0.5, 0.5]),
                ..CompletedIngestion::default()
            },
        )
        .unwrap();
    service.mark_failed(&broken.id, "unreachable").unwrap();
    assert!(service
        .mark_completed(&done.id, CompletedIngestion::default())
        .is_err());

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![(done.id.clone(), Some("[0.5,0.5]".to_string()))]
    );
}
