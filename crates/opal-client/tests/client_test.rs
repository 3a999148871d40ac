//! Integration tests for `OpenProjectClient` against an in-process mock
//! of the OpenProject v3 API.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use opal_client::{ApiError, OpenProjectClient, Settings};
use opal_core::{
    SortOrder, WorkPackageCreateRequest, WorkPackageQuery, WorkPackageUpdate,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

const API_KEY: &str = "0123456789abcdef0123456789abcdef";

/// One observed request.
#[derive(Debug, Clone)]
struct LogEntry {
    method: String,
    path: String,
    query: HashMap<String, String>,
    body: Option<Value>,
}

#[derive(Default)]
struct MockState {
    log: Mutex<Vec<LogEntry>>,
    auth_headers: Mutex<Vec<String>>,
    type_fetches: AtomicUsize,
}

impl MockState {
    fn record(
        &self,
        method: &str,
        path: String,
        query: HashMap<String, String>,
        body: Option<Value>,
    ) {
        self.log.lock().unwrap().push(LogEntry {
            method: method.to_string(),
            path,
            query,
            body,
        });
    }

    fn entries(&self) -> Vec<LogEntry> {
        self.log.lock().unwrap().clone()
    }
}

type Shared = Arc<MockState>;

fn envelope(elements: Vec<Value>, total: u64) -> Value {
    json!({ "total": total, "count": elements.len(), "_embedded": { "elements": elements } })
}

async fn root(State(state): State<Shared>, headers: HeaderMap) -> Json<Value> {
    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        state.auth_headers.lock().unwrap().push(auth.to_string());
    }
    state.record("GET", "/api/v3/".to_string(), HashMap::new(), None);
    Json(json!({ "coreVersion": "13.4.1", "instanceName": "mock" }))
}

async fn list_projects(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    state.record("GET", "/api/v3/projects".to_string(), query, None);
    Json(envelope(
        vec![json!({"id": 1, "name": "Alpha"}), json!({"id": 2, "name": "Beta"})],
        2,
    ))
}

/// Paginated work package listing: project 77 holds 237 items, project 88
/// claims 500 but serves only the first page (inconsistent server state).
async fn project_work_packages(
    State(state): State<Shared>,
    Path(project_id): Path<i64>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let offset: u64 = query.get("offset").map_or(0, |v| v.parse().unwrap_or(0));
    state.record(
        "GET",
        format!("/api/v3/projects/{project_id}/work_packages"),
        query,
        None,
    );

    match project_id {
        77 => {
            let total = 237;
            let end = (offset + 100).min(total);
            let elements = (offset..end).map(|i| json!({"id": i})).collect();
            Json(envelope(elements, total))
        }
        88 => {
            let elements = if offset == 0 {
                (0..100).map(|i| json!({"id": i})).collect()
            } else {
                Vec::new()
            };
            Json(envelope(elements, 500))
        }
        _ => Json(envelope(Vec::new(), 0)),
    }
}

async fn search_work_packages(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    state.record("GET", "/api/v3/work_packages".to_string(), query, None);
    Json(envelope(Vec::new(), 0))
}

async fn create_work_package(
    State(state): State<Shared>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.record(
        "POST",
        "/api/v3/work_packages".to_string(),
        HashMap::new(),
        Some(body.clone()),
    );
    let mut created = body;
    created["id"] = json!(301);
    created["lockVersion"] = json!(0);
    (StatusCode::CREATED, Json(created))
}

async fn get_work_package(
    State(state): State<Shared>,
    Path(id): Path<i64>,
) -> axum::response::Response {
    state.record(
        "GET",
        format!("/api/v3/work_packages/{id}"),
        HashMap::new(),
        None,
    );
    match id {
        // 44 exists but is malformed: no lock version.
        44 => Json(json!({"id": 44, "subject": "No lock"})).into_response(),
        999 => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "_embedded": { "errors": [
                    {"message": "The requested resource could not be found."}
                ]}
            })),
        )
            .into_response(),
        _ => Json(json!({"id": id, "subject": "Existing", "lockVersion": 7})).into_response(),
    }
}

async fn patch_work_package(
    State(state): State<Shared>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> axum::response::Response {
    state.record(
        "PATCH",
        format!("/api/v3/work_packages/{id}"),
        HashMap::new(),
        Some(body.clone()),
    );
    // Work package 43 is perpetually contended: every token is stale.
    if id == 43 {
        return (
            StatusCode::CONFLICT,
            Json(json!({
                "_embedded": { "errors": [
                    {"message": "The resource you are about to edit was changed in the meantime."}
                ]}
            })),
        )
            .into_response();
    }
    let mut updated = body;
    updated["id"] = json!(id);
    Json(updated).into_response()
}

async fn work_package_activities(
    State(state): State<Shared>,
    Path(id): Path<i64>,
) -> Json<Value> {
    state.record(
        "GET",
        format!("/api/v3/work_packages/{id}/activities"),
        HashMap::new(),
        None,
    );
    Json(envelope(
        vec![json!({"id": 1, "comment": {"raw": "First!"}})],
        1,
    ))
}

async fn add_activity(
    State(state): State<Shared>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.record(
        "POST",
        format!("/api/v3/work_packages/{id}/activities"),
        HashMap::new(),
        Some(body.clone()),
    );
    (StatusCode::CREATED, Json(json!({"id": 9, "comment": body["comment"]})))
}

async fn create_relation(
    State(state): State<Shared>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.record(
        "POST",
        format!("/api/v3/work_packages/{id}/relations"),
        HashMap::new(),
        Some(body.clone()),
    );
    (StatusCode::CREATED, Json(json!({"id": 55, "type": body["type"]})))
}

async fn delete_relation(
    State(state): State<Shared>,
    Path(id): Path<i64>,
) -> StatusCode {
    state.record(
        "DELETE",
        format!("/api/v3/relations/{id}"),
        HashMap::new(),
        None,
    );
    // Deliberately bodyless.
    StatusCode::NO_CONTENT
}

async fn list_types(State(state): State<Shared>) -> Json<Value> {
    state.type_fetches.fetch_add(1, Ordering::SeqCst);
    state.record("GET", "/api/v3/types".to_string(), HashMap::new(), None);
    Json(envelope(
        vec![json!({"id": 1, "name": "Task"}), json!({"id": 2, "name": "Bug"})],
        2,
    ))
}

async fn list_users(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let filters = query.get("filters").cloned().unwrap_or_default();
    state.record("GET", "/api/v3/users".to_string(), query, None);
    if filters.contains("amelia@example.com") {
        Json(envelope(
            vec![json!({"id": 5, "name": "Amelia", "email": "amelia@example.com"})],
            1,
        ))
    } else {
        Json(envelope(Vec::new(), 0))
    }
}

/// Misbehaving endpoint: answers 200 with an HTML body.
async fn not_json(State(state): State<Shared>) -> (StatusCode, &'static str) {
    state.record("GET", "/api/v3/priorities".to_string(), HashMap::new(), None);
    (StatusCode::OK, "<html>not json</html>")
}

fn router(state: Shared) -> Router {
    Router::new()
        .route("/api/v3/", get(root))
        .route("/api/v3/projects", get(list_projects))
        .route("/api/v3/priorities", get(not_json))
        .route(
            "/api/v3/projects/{id}/work_packages",
            get(project_work_packages),
        )
        .route(
            "/api/v3/work_packages",
            get(search_work_packages).post(create_work_package),
        )
        .route(
            "/api/v3/work_packages/{id}",
            get(get_work_package).patch(patch_work_package),
        )
        .route(
            "/api/v3/work_packages/{id}/activities",
            get(work_package_activities).post(add_activity),
        )
        .route("/api/v3/work_packages/{id}/relations", post(create_relation))
        .route("/api/v3/relations/{id}", delete(delete_relation))
        .route("/api/v3/types", get(list_types))
        .route("/api/v3/users", get(list_users))
        .with_state(state)
}

async fn start_mock() -> (OpenProjectClient, Shared) {
    let state = Arc::new(MockState::default());
    let app = router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let settings = Settings::new(format!("http://{addr}"), API_KEY).unwrap();
    let client = OpenProjectClient::new(&settings).unwrap();
    (client, state)
}

#[tokio::test]
async fn test_probe_sends_basic_auth_and_reads_version() {
    let (client, state) = start_mock().await;

    let status = client.test_connection().await;
    assert!(status.success);
    assert_eq!(status.version.as_deref(), Some("13.4.1"));

    let expected = format!("Basic {}", BASE64.encode(format!("apikey:{API_KEY}")));
    let seen = state.auth_headers.lock().unwrap().clone();
    assert_eq!(seen, vec![expected]);
}

#[tokio::test]
async fn test_single_page_listing_returns_elements() {
    let (client, _state) = start_mock().await;

    let projects = client.get_projects(false).await.unwrap();
    assert_eq!(projects.len(), 2);
    assert_eq!(projects[0]["name"], json!("Alpha"));
}

#[tokio::test]
async fn test_pagination_walks_all_pages_in_order() {
    let (client, state) = start_mock().await;

    let items = client.get_work_packages(77, true).await.unwrap();
    assert_eq!(items.len(), 237);
    // Arrival order preserved across page boundaries.
    for (i, item) in items.iter().enumerate() {
        assert_eq!(item["id"], json!(i));
    }

    let offsets: Vec<String> = state
        .entries()
        .iter()
        .filter(|e| e.path.ends_with("/work_packages"))
        .map(|e| e.query.get("offset").cloned().unwrap())
        .collect();
    assert_eq!(offsets, ["0", "100", "200"]);
}

#[tokio::test]
async fn test_pagination_stops_on_empty_page() {
    let (client, state) = start_mock().await;

    // Server claims total=500 but has nothing past the first page.
    let items = client.get_work_packages(88, true).await.unwrap();
    assert_eq!(items.len(), 100);
    let calls = state
        .entries()
        .iter()
        .filter(|e| e.path.contains("/projects/88/"))
        .count();
    assert_eq!(calls, 2);
}

#[tokio::test]
async fn test_update_fetches_lock_version_before_patch() {
    let (client, state) = start_mock().await;

    let update = WorkPackageUpdate::new().subject("Retitled").status(4);
    let result = client.update_work_package(42, &update).await.unwrap();
    assert_eq!(result["subject"], json!("Retitled"));

    let entries = state.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].method, "GET");
    assert_eq!(entries[0].path, "/api/v3/work_packages/42");
    assert_eq!(entries[1].method, "PATCH");
    assert_eq!(entries[1].path, "/api/v3/work_packages/42");

    let patch_body = entries[1].body.as_ref().unwrap();
    assert_eq!(patch_body["lockVersion"], json!(7));
    assert_eq!(
        patch_body["_links"]["status"]["href"],
        json!("/api/v3/statuses/4")
    );
}

#[tokio::test]
async fn test_stale_lock_version_conflict_surfaces_as_protocol() {
    let (client, _state) = start_mock().await;

    let update = WorkPackageUpdate::new().subject("Doomed");
    let err = client.update_work_package(43, &update).await.unwrap_err();
    assert_eq!(err.status(), Some(409));
    assert_eq!(
        err.to_string(),
        "The resource you are about to edit was changed in the meantime."
    );
}

#[tokio::test]
async fn test_missing_lock_version_is_state_error_without_patch() {
    let (client, state) = start_mock().await;

    let update = WorkPackageUpdate::new().subject("Whatever");
    let err = client.update_work_package(44, &update).await.unwrap_err();
    assert!(matches!(err, ApiError::State(_)));

    let methods: Vec<String> = state.entries().iter().map(|e| e.method.clone()).collect();
    assert_eq!(methods, ["GET"]);
}

#[tokio::test]
async fn test_not_found_uses_embedded_error_message() {
    let (client, _state) = start_mock().await;

    let err = client.get_work_package(999).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.to_string(), "The requested resource could not be found.");
}

#[tokio::test]
async fn test_create_work_package_sends_payload() {
    let (client, state) = start_mock().await;

    let request = WorkPackageCreateRequest::new(12, "Ship it")
        .unwrap()
        .with_assignee(5)
        .with_due_date("2024-10-01");
    let created = client.create_work_package(&request).await.unwrap();
    assert_eq!(created["id"], json!(301));

    let entries = state.entries();
    let body = entries[0].body.as_ref().unwrap();
    assert_eq!(body["subject"], json!("Ship it"));
    assert_eq!(body["_links"]["project"]["href"], json!("/api/v3/projects/12"));
    assert_eq!(body["dueDate"], json!("2024-10-01"));
}

#[tokio::test]
async fn test_search_sends_filters_and_sort() {
    let (client, state) = start_mock().await;

    let query = WorkPackageQuery::new()
        .in_project(5)
        .with_statuses([1, 2])
        .sorted_by("dueDate", SortOrder::Asc)
        .with_page_size(250);
    client.search_work_packages(&query).await.unwrap();

    let entries = state.entries();
    let sent = &entries[0].query;
    assert_eq!(sent.get("pageSize").unwrap(), "100");
    assert_eq!(sent.get("sortBy").unwrap(), r#"[["dueDate","asc"]]"#);

    let filters: Value = serde_json::from_str(sent.get("filters").unwrap()).unwrap();
    assert_eq!(
        filters,
        json!([
            {"project": {"operator": "=", "values": ["5"]}},
            {"status": {"operator": "=", "values": ["1", "2"]}}
        ])
    );
}

#[tokio::test]
async fn test_comment_posts_to_activities() {
    let (client, state) = start_mock().await;

    client.add_comment(42, "Deployed to staging").await.unwrap();

    let entries = state.entries();
    assert_eq!(entries[0].method, "POST");
    assert_eq!(entries[0].path, "/api/v3/work_packages/42/activities");
    assert_eq!(
        entries[0].body.as_ref().unwrap()["comment"]["raw"],
        json!("Deployed to staging")
    );
}

#[tokio::test]
async fn test_reference_data_cached_until_invalidated() {
    let (client, state) = start_mock().await;

    let types = client.get_types(true).await.unwrap();
    assert_eq!(types.len(), 2);
    client.get_types(true).await.unwrap();
    assert_eq!(state.type_fetches.load(Ordering::SeqCst), 1);

    // Bypassing the cache always fetches.
    client.get_types(false).await.unwrap();
    assert_eq!(state.type_fetches.load(Ordering::SeqCst), 2);

    // Invalidation takes effect on the next cached lookup.
    client.invalidate_cache("work_package_types").await;
    client.get_types(true).await.unwrap();
    assert_eq!(state.type_fetches.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_assign_by_email_resolves_user_then_patches() {
    let (client, state) = start_mock().await;

    client
        .assign_work_package_by_email(42, "amelia@example.com")
        .await
        .unwrap();

    let entries = state.entries();
    let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(
        paths,
        [
            "/api/v3/users",
            "/api/v3/work_packages/42",
            "/api/v3/work_packages/42"
        ]
    );
    let patch_body = entries[2].body.as_ref().unwrap();
    assert_eq!(
        patch_body["_links"]["assignee"]["href"],
        json!("/api/v3/users/5")
    );
    assert_eq!(patch_body["lockVersion"], json!(7));
}

#[tokio::test]
async fn test_assign_by_email_unknown_user_is_state_error() {
    let (client, state) = start_mock().await;

    let err = client
        .assign_work_package_by_email(42, "nobody@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::State(_)));

    // Only the user lookup ran; the work package was never touched.
    let entries = state.entries();
    let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, ["/api/v3/users"]);
}

#[tokio::test]
async fn test_empty_2xx_body_yields_empty_object() {
    let (client, _state) = start_mock().await;

    let result = client.delete_relation(55).await.unwrap();
    assert_eq!(result, json!({}));
}

#[tokio::test]
async fn test_non_json_2xx_body_is_protocol_error() {
    let (client, _state) = start_mock().await;

    // The priorities endpoint of this mock serves HTML with a 200.
    let err = client.get_priorities(false).await.unwrap_err();
    assert_eq!(err.status(), Some(200));
    assert!(err.to_string().starts_with("Invalid JSON response:"));
}

#[tokio::test]
async fn test_transport_error_when_unreachable() {
    let settings = Settings::new("http://127.0.0.1:9", API_KEY).unwrap();
    let client = OpenProjectClient::new(&settings).unwrap();

    let err = client.get_projects(false).await.unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)));
    assert!(err.to_string().starts_with("Request failed:"));
    assert!(err.status().is_none());
}

#[tokio::test]
async fn test_relation_created_from_source_work_package() {
    let (client, state) = start_mock().await;

    let request = opal_core::RelationCreateRequest::new(10, 11)
        .unwrap()
        .with_type("blocks");
    let relation = client.create_relation(&request).await.unwrap();
    assert_eq!(relation["id"], json!(55));

    let entries = state.entries();
    assert_eq!(entries[0].path, "/api/v3/work_packages/10/relations");
    assert_eq!(
        entries[0].body.as_ref().unwrap()["_links"]["to"]["href"],
        json!("/api/v3/work_packages/11")
    );
}

#[tokio::test]
async fn test_activities_listed() {
    let (client, _state) = start_mock().await;

    let activities = client.get_activities(42).await.unwrap();
    assert_eq!(activities.len(), 1);
    assert_eq!(activities[0]["comment"]["raw"], json!("First!"));
}
