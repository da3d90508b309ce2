//! HTTP contract tests against the in-memory backend
//!
//! Drive the real router with `oneshot`; no listener and no database.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use littlesteps_server::storage::MemoryBackend;
use littlesteps_server::{build_router, AppState, Connector};

struct TestApp {
    backend: Arc<MemoryBackend>,
    router: Router,
}

impl TestApp {
    fn new() -> Self {
        Self::with_timeout(Duration::from_secs(1))
    }

    fn with_timeout(timeout: Duration) -> Self {
        let backend = Arc::new(MemoryBackend::new());
        let connector = Connector::with_backend(backend.clone(), timeout);
        let router = build_router(AppState::builtin(connector), false);
        Self { backend, router }
    }

    async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, None).await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(body)).await
    }

    /// Create and return the new document's id.
    async fn create(&self, resource: &str, body: Value) -> String {
        let (status, body) = self.post(&format!("/{}", resource), body).await;
        assert_eq!(status, StatusCode::CREATED, "create failed: {body}");
        body["data"]["id"].as_str().unwrap().to_owned()
    }
}

fn assert_error(body: &Value, code: &str) {
    assert_eq!(body["status"], "error", "not an error envelope: {body}");
    assert_eq!(body["code"], code, "unexpected code: {body}");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn create_get_delete_lifecycle() {
    let app = TestApp::new();

    let (status, created) = app.post("/children", json!({"name": "Ana", "age": 3})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "success");
    let id = created["data"]["id"].as_str().unwrap().to_owned();
    assert_eq!(created["data"], json!({"id": id, "name": "Ana", "age": 3}));

    let (status, fetched) = app.get(&format!("/children/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["data"], created["data"]);

    let (status, body) = app.send(Method::DELETE, &format!("/children/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, body) = app.get(&format!("/children/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_error(&body, "NotFound");

    let (status, _) = app.send(Method::DELETE, &format!("/children/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_required_field_is_rejected_before_storage() {
    let app = TestApp::new();

    let (status, body) = app.post("/children", json!({"age": 3})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "ValidationError");

    let (_, listed) = app.get("/children").await;
    assert_eq!(listed["data"], json!([]));
}

#[tokio::test]
async fn wrong_types_and_unknown_fields_are_rejected() {
    let app = TestApp::new();

    let (status, body) = app.post("/children", json!({"name": "Ana", "age": "three"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "ValidationError");

    let (status, _) = app.post("/children", json!({"name": "Ana", "shoe_size": 24})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.post("/children", json!({"name": "Ana", "id": "x"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn permissive_resources_keep_undeclared_fields() {
    let app = TestApp::new();

    let id = app
        .create("staff", json!({"name": "Lee", "role": "teacher", "shift": "early"}))
        .await;
    let (_, body) = app.get(&format!("/staff/{id}")).await;
    assert_eq!(body["data"]["shift"], "early");

    let (status, body) = app.get("/staff?shift=early").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn operator_field_names_never_reach_the_store() {
    let app = TestApp::new();
    let id = app.create("staff", json!({"name": "Lee", "role": "teacher"})).await;

    let (status, body) = app.get("/staff?%24where=sleep(5000)").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "ValidationError");

    let (status, body) = app
        .post("/staff", json!({"name": "Kim", "role": "cook", "$set": {"role": "admin"}}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "ValidationError");

    let (status, body) = app
        .send(Method::PATCH, &format!("/staff/{id}"), Some(json!({"name.first": "L"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "ValidationError");

    let (_, body) = app.get(&format!("/staff/{id}")).await;
    assert_eq!(body["data"], json!({"id": id, "name": "Lee", "role": "teacher"}));
    let (_, listed) = app.get("/staff").await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn wrong_method_is_an_enveloped_404() {
    let app = TestApp::new();
    let id = app.create("children", json!({"name": "Ana"})).await;

    let (status, body) = app.post(&format!("/children/{id}"), json!({"name": "Bo"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_error(&body, "NotFound");

    let (status, body) = app.send(Method::DELETE, "/children", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_error(&body, "NotFound");
}

#[tokio::test]
async fn malformed_json_is_a_validation_error() {
    let app = TestApp::new();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/children")
                .header("content-type", "application/json")
                .body(Body::from("{\"name\": "))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, body) = app.post("/children", json!(["Ana"])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "ValidationError");
}

#[tokio::test]
async fn malformed_identifier_is_400() {
    let app = TestApp::new();

    for method in [Method::GET, Method::DELETE] {
        let (status, body) = app.send(method, "/children/not-an-id", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_error(&body, "ValidationError");
    }
}

#[tokio::test]
async fn unknown_resource_type_is_404() {
    let app = TestApp::new();

    let (status, body) = app.get("/drawings").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_error(&body, "NotFound");

    let (status, _) = app.post("/drawings", json!({"name": "x"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_filters_by_exact_match() {
    let app = TestApp::new();
    for (name, group, age) in [("Ana", "Bees", 3), ("Bo", "Owls", 4), ("Cy", "Bees", 4)] {
        app.create("children", json!({"name": name, "group": group, "age": age}))
            .await;
    }

    let (_, all) = app.get("/children").await;
    assert_eq!(all["data"].as_array().unwrap().len(), 3);

    let (status, bees) = app.get("/children?group=Bees&age=4").await;
    assert_eq!(status, StatusCode::OK);
    let bees = bees["data"].as_array().unwrap();
    assert_eq!(bees.len(), 1);
    assert_eq!(bees[0]["name"], "Cy");

    let (status, body) = app.get("/children?favourite_colour=red").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "ValidationError");
}

#[tokio::test]
async fn updates_are_partial() {
    let app = TestApp::new();
    let id = app
        .create("children", json!({"name": "Ana", "age": 3, "group": "Bees", "notes": "naps"}))
        .await;

    let (status, body) = app
        .send(Method::PATCH, &format!("/children/{id}"), Some(json!({"group": "Owls"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"],
        json!({"id": id, "name": "Ana", "age": 3, "group": "Owls", "notes": "naps"})
    );

    let (status, body) = app
        .send(Method::PUT, &format!("/children/{id}"), Some(json!({"notes": null})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].get("notes").is_none());
    assert_eq!(body["data"]["group"], "Owls");

    let (status, _) = app
        .send(Method::PUT, &format!("/children/{id}"), Some(json!({"name": null})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(Method::PUT, &format!("/children/{id}"), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_of_absent_document_is_404() {
    let app = TestApp::new();
    let (status, body) = app
        .send(
            Method::PUT,
            "/children/65f1c0ffee0000000000beef",
            Some(json!({"group": "Owls"})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_error(&body, "NotFound");
}

#[tokio::test]
async fn link_supervisor_adds_once() {
    let app = TestApp::new();
    let child = app.create("children", json!({"name": "Ana"})).await;
    let supervisor = app.create("staff", json!({"name": "Lee", "role": "teacher"})).await;

    for _ in 0..2 {
        let (status, _) = app
            .send(
                Method::PUT,
                &format!("/children/{child}/link-supervisor"),
                Some(json!({"supervisor_id": supervisor})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, body) = app.get(&format!("/children/{child}")).await;
    assert_eq!(body["data"]["supervisor_ids"], json!([supervisor]));

    let (status, _) = app
        .send(
            Method::PUT,
            &format!("/children/{child}/link-parent"),
            Some(json!({"parent_id": "nope"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            Method::PUT,
            &format!("/children/{child}/link-sibling"),
            Some(json!({"sibling_id": supervisor})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn activities_reference_existing_children() {
    let app = TestApp::new();

    let (status, body) = app
        .post(
            "/activities",
            json!({"child_id": "65f1c0ffee0000000000beef", "type": "meal", "details": {}}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "ValidationError");

    let child = app.create("children", json!({"name": "Ana"})).await;
    let (status, body) = app
        .post(
            "/activities",
            json!({"child_id": child, "type": "meal", "details": {"ate": "all"}}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["data"]["created_at"].is_string());

    let (_, listed) = app.get(&format!("/activities?child_id={child}&type=meal")).await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn store_outage_is_503_without_driver_text() {
    let app = TestApp::new();
    let id = app.create("children", json!({"name": "Ana"})).await;
    app.backend.set_offline(true);

    let (status, body) = app.get(&format!("/children/{id}")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_error(&body, "StorageUnavailable");
    assert!(body["correlation_id"].is_string());
    assert!(!body["message"].as_str().unwrap().contains("refused"));

    let (status, _) = app.post("/children", json!({"name": "Bo"})).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_error(&body, "StorageUnavailable");
}

#[tokio::test]
async fn hung_store_answers_within_timeout() {
    let app = TestApp::with_timeout(Duration::from_millis(50));
    app.backend.set_latency(Duration::from_secs(30));

    let started = Instant::now();
    let (status, body) = app.get("/children").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_error(&body, "StorageUnavailable");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn health_reports_storage_up() {
    let app = TestApp::new();
    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["storage"], "up");
}

#[tokio::test]
async fn concurrent_creates_get_distinct_ids() {
    let app = Arc::new(TestApp::new());

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let app = app.clone();
            tokio::spawn(async move {
                app.create("children", json!({"name": format!("child-{i}")})).await
            })
        })
        .collect();

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 20);

    let (_, listed) = app.get("/children").await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 20);
}
