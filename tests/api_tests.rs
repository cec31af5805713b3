mod test_harness;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use jobq::api;
use jobq::service::JobService;

use test_harness::{test_config, EchoExecutor};

/// Router over a service with no dispatcher: submitted jobs stay pending,
/// which is all the handler tests need.
fn test_app() -> Router {
    let (service, _dispatcher) = JobService::build(
        &test_config(1),
        Arc::new(EchoExecutor),
        CancellationToken::new(),
    );
    api::router(service)
}

async fn response_json(response: axum::response::Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn post_job(body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/jobs")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn submit(app: &Router, command: &str) -> String {
    let response = app
        .clone()
        .oneshot(post_job(json!({ "command": command })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    body["job_id"].as_str().unwrap().to_string()
}

/// The error envelope carries status, kind, message, timestamp, error_id and
/// details on every non-2xx response.
fn assert_error_envelope(body: &Value, status: u16) {
    assert_eq!(body["status"], status);
    assert_eq!(body["kind"], "error");
    assert!(!body["message"].as_str().unwrap().is_empty());
    assert!(!body["timestamp"].as_str().unwrap().is_empty());
    assert!(!body["error_id"].as_str().unwrap().is_empty());
    assert!(!body["request_id"].as_str().unwrap().is_empty());
    assert!(body["details"].is_object());
}

#[tokio::test]
async fn test_health() {
    let response = test_app().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["status"], "ok");
    assert!(!body["timestamp"].as_str().unwrap().is_empty());
    assert!(!body["version"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_submit_and_fetch_job() {
    let app = test_app();
    let job_id = submit(&app, "echo hi").await;

    let response = app
        .clone()
        .oneshot(get(&format!("/api/jobs/{job_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["id"], job_id.as_str());
    assert_eq!(body["command"], "echo hi");
    assert_eq!(body["status"], "pending");
    assert_eq!(body["priority"], "normal");
    assert_eq!(body["timeout_ms"], 30_000);
    assert_eq!(body["max_retries"], 3);
}

#[tokio::test]
async fn test_submit_empty_command_rejected() {
    let response = test_app()
        .oneshot(post_job(json!({ "command": "" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response_json(response).await;
    assert_error_envelope(&body, 400);
    assert_eq!(body["details"]["field"], "command");
}

#[tokio::test]
async fn test_submit_invalid_priority_rejected() {
    let response = test_app()
        .oneshot(post_job(json!({ "command": "x", "priority": "urgent" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response_json(response).await;
    assert_error_envelope(&body, 400);
    assert_eq!(body["details"]["field"], "priority");
    assert!(body["message"].as_str().unwrap().contains("urgent"));
}

#[tokio::test]
async fn test_submit_non_positive_timeout_rejected() {
    let response = test_app()
        .oneshot(post_job(json!({ "command": "x", "timeout": 0 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response_json(response).await;
    assert_error_envelope(&body, 400);
    assert_eq!(body["details"]["field"], "timeout");
}

#[tokio::test]
async fn test_submit_malformed_body_rejected() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/jobs")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = test_app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response_json(response).await;
    assert_error_envelope(&body, 400);
}

#[tokio::test]
async fn test_get_invalid_id_rejected() {
    let response = test_app()
        .oneshot(get("/api/jobs/not-a-uuid"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response_json(response).await;
    assert_error_envelope(&body, 400);
}

#[tokio::test]
async fn test_get_unknown_id_not_found() {
    let response = test_app()
        .oneshot(get("/api/jobs/00000000-0000-4000-8000-000000000000"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = response_json(response).await;
    assert_error_envelope(&body, 404);
}

#[tokio::test]
async fn test_list_jobs() {
    let app = test_app();
    for i in 0..3 {
        submit(&app, &format!("echo {i}")).await;
    }

    let response = app.clone().oneshot(get("/api/jobs")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["total"], 3);
    assert_eq!(body["limit"], 100);
    assert_eq!(body["offset"], 0);
    assert_eq!(body["jobs"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_list_invalid_query_rejected() {
    let app = test_app();

    for uri in [
        "/api/jobs?limit=0",
        "/api/jobs?limit=-3",
        "/api/jobs?limit=abc",
        "/api/jobs?offset=-1",
        "/api/jobs?status=bogus",
    ] {
        let response = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "uri: {uri}");
        let body = response_json(response).await;
        assert_error_envelope(&body, 400);
    }
}

#[tokio::test]
async fn test_list_limit_clamped() {
    let app = test_app();
    submit(&app, "echo hi").await;

    let response = app
        .clone()
        .oneshot(get("/api/jobs?limit=5000"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["limit"], 1000);
}

#[tokio::test]
async fn test_list_offset_beyond_total() {
    let app = test_app();
    submit(&app, "echo 1").await;
    submit(&app, "echo 2").await;

    let response = app
        .clone()
        .oneshot(get("/api/jobs?offset=50"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["total"], 2);
    assert!(body["jobs"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_job_and_idempotence() {
    let app = test_app();
    let job_id = submit(&app, "echo hi").await;

    let delete = |job_id: &str| {
        Request::builder()
            .method(Method::DELETE)
            .uri(format!("/api/jobs/{job_id}"))
            .body(Body::empty())
            .unwrap()
    };

    let response = app.clone().oneshot(delete(&job_id)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["job_id"], job_id.as_str());
    assert_eq!(body["status"], "cancelled");

    // Cancelling again changes nothing.
    let response = app.clone().oneshot(delete(&job_id)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["status"], "cancelled");
}

#[tokio::test]
async fn test_cancel_unknown_job_not_found() {
    let request = Request::builder()
        .method(Method::DELETE)
        .uri("/api/jobs/no-such-id")
        .body(Body::empty())
        .unwrap();
    let response = test_app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_route() {
    let response = test_app().oneshot(get("/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = response_json(response).await;
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["path"], "/nope");
    assert_eq!(body["method"], "GET");
    assert!(!body["message"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_unsupported_method() {
    let request = Request::builder()
        .method(Method::PUT)
        .uri("/api/jobs")
        .body(Body::empty())
        .unwrap();
    let response = test_app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_request_id_propagation() {
    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "test-correlation-id")
        .body(Body::empty())
        .unwrap();
    let response = test_app().oneshot(request).await.unwrap();
    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "test-correlation-id"
    );

    // A missing request id is assigned by the server.
    let response = test_app().oneshot(get("/health")).await.unwrap();
    assert!(!response
        .headers()
        .get("x-request-id")
        .unwrap()
        .to_str()
        .unwrap()
        .is_empty());
}
