use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::bus::EventBus;
use crate::collections::{register_handlers, CollectionService};
use crate::db::Database;
use crate::embeddings::providers::HashingEmbeddingProvider;
use crate::embeddings::HashingEmbeddingConfig;
use crate::ingestion::{ContentFetcher, FetchedContent, IngestionError, IngestionPipeline};
use crate::resources::{CompletedIngestion, CreateResource, ResourceService};

use super::*;

struct FixedFetcher;

#[async_trait]
impl ContentFetcher for FixedFetcher {
    async fn fetch(&self, _url: &str) -> Result<FetchedContent, IngestionError> {
        Ok(FetchedContent {
            title: Some("Fetched title".to_string()),
            text: "vector search over papers".to_string(),
        })
    }
}

fn state() -> ServiceState {
    let db = Arc::new(Database::open_in_memory().expect("in-memory DB"));
    let bus = Arc::new(EventBus::new());
    let resources = Arc::new(ResourceService::new(db.clone(), bus.clone()));
    let collections = Arc::new(CollectionService::new(db));
    register_handlers(&bus, collections.clone());
    let embedder = HashingEmbeddingProvider::new(HashingEmbeddingConfig { dims: 16 }, true)
        .expect("hashing provider");
    let ingestion =
        IngestionPipeline::start(resources.clone(), Arc::new(FixedFetcher), Arc::new(embedder));
    ServiceState {
        resources,
        collections,
        ingestion,
    }
}

async fn send(state: &ServiceState, method: Method, uri: &str, body: Option<Value>) -> Response {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap_or_else(|err| panic!("failed to build request: {err}"));

    match app(state.clone()).oneshot(request).await {
        Ok(response) => response,
        Err(err) => panic!("router request failed: {err}"),
    }
}

async fn response_json(response: Response) -> Value {
    let bytes = match to_bytes(response.into_body(), 1024 * 1024).await {
        Ok(bytes) => bytes,
        Err(err) => panic!("failed to read response body: {err}"),
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(err) => panic!("response body is not JSON: {err}"),
    }
}

fn completed_resource(state: &ServiceState, title: &str, embedding: Vec<f32>) -> String {
    let resource = state
        .resources
        .create(CreateResource {
            title: Some(title.to_string()),
            content: Some(title.to_string()),
            ..CreateResource::default()
        })
        .unwrap();
    state
        .resources
        .mark_completed(
            &resource.id,
            CompletedIngestion {
                embedding: Some(embedding),
                ..CompletedIngestion::default()
            },
        )
        .unwrap();
    resource.id
}

#[tokio::test]
async fn health_reports_ok() {
    let state = state();
    let response = send(&state, Method::GET, "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await, json!({ "status": "ok" }));
}

#[tokio::test]
async fn created_resource_is_ingested_in_the_background() {
    let state = state();
    let response = send(
        &state,
        Method::POST,
        "/resources",
        Some(json!({ "url": "https://example.org/paper" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let accepted = response_json(response).await;
    let id = accepted["id"].as_str().expect("id").to_string();
    assert_eq!(accepted["message"], "ingestion queued");

    let mut last = Value::Null;
    for _ in 0..200 {
        let response = send(&state, Method::GET, &format!("/resources/{id}/status"), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        last = response_json(response).await;
        if last["ingestion_status"] == "completed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(last["ingestion_status"], "completed");
    assert!(last["ingestion_completed_at"].is_string());

    let resource = response_json(send(&state, Method::GET, &format!("/resources/{id}"), None).await).await;
    assert_eq!(resource["title"], "Fetched title");
    assert_eq!(resource["content"], "vector search over papers");
    assert_eq!(resource["embedding"].as_array().map(Vec::len), Some(16));
}

#[tokio::test]
async fn invalid_create_bodies_are_rejected_with_json_errors() {
    let state = state();

    let response = send(&state, Method::POST, "/resources", Some(json!({ "title": "only" }))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("url or content"));

    let response = send(&state, Method::POST, "/collections", Some(json!({ "name": 7 }))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response_json(response).await["error"].is_string());
}

#[tokio::test]
async fn list_supports_paging_sorting_and_rejects_unknown_sort_fields() {
    let state = state();
    for title in ["beta", "alpha", "gamma"] {
        state
            .resources
            .create(CreateResource {
                title: Some(title.to_string()),
                content: Some(title.to_string()),
                ..CreateResource::default()
            })
            .unwrap();
    }

    let response = send(
        &state,
        Method::GET,
        "/resources?sort_by=title&sort_dir=asc&limit=2&offset=1",
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = response_json(response).await;
    assert_eq!(page["total"], 3);
    assert_eq!(page["limit"], 2);
    let titles: Vec<&str> = page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["beta", "gamma"]);

    let response = send(&state, Method::GET, "/resources?sort_by=popularity", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response_json(response).await["error"].is_string());
}

#[tokio::test]
async fn unknown_ids_are_404() {
    let state = state();
    for (method, uri) in [
        (Method::GET, "/resources/nope"),
        (Method::GET, "/resources/nope/status"),
        (Method::DELETE, "/resources/nope"),
        (Method::GET, "/collections/nope"),
        (Method::DELETE, "/collections/nope/resources/nope"),
    ] {
        let response = send(&state, method, uri, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        let body = response_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("not found"), "{uri}");
    }
}

#[tokio::test]
async fn deleting_a_member_resource_updates_its_collection() {
    let state = state();
    let keep = completed_resource(&state, "keep", vec![0.0, 1.0]);
    let doomed = completed_resource(&state, "doomed", vec![1.0, 0.0]);

    let response = send(
        &state,
        Method::POST,
        "/collections",
        Some(json!({ "name": "reading list" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let collection = response_json(response).await;
    let cid = collection["id"].as_str().unwrap().to_string();
    assert!(collection["embedding"].is_null());

    for rid in [&keep, &doomed] {
        let response = send(
            &state,
            Method::POST,
            &format!("/collections/{cid}/resources"),
            Some(json!({ "resource_id": rid })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = send(&state, Method::DELETE, &format!("/resources/{doomed}"), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let collection =
        response_json(send(&state, Method::GET, &format!("/collections/{cid}"), None).await).await;
    assert_eq!(collection["embedding"], json!([0.0, 1.0]));

    let members = response_json(
        send(&state, Method::GET, &format!("/collections/{cid}/resources"), None).await,
    )
    .await;
    let ids: Vec<&str> = members
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![keep.as_str()]);

    let response = send(
        &state,
        Method::DELETE,
        &format!("/collections/{cid}/resources/{keep}"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response_json(response).await["embedding"].is_null());

    let listed = response_json(send(&state, Method::GET, "/collections", None).await).await;
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
}
