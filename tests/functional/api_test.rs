//! Functional tests for the HTTP API

use axum::{
    body::{to_bytes, Body},
    http::{header::CONTENT_TYPE, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use imagegen_gateway::{api::routes::create_router, config::Settings, AppState};

use crate::common::{balancer, status, success, ScriptedBackend};

fn create_test_app(keys: &[&str], backend: Arc<ScriptedBackend>) -> (Arc<AppState>, Router) {
    let mut settings = Settings::default();
    settings.frontend.dist_dir = "/nonexistent/dist".to_string();
    settings.retry.base_delay_ms = 1;

    let state = Arc::new(AppState::new(settings, balancer(keys), backend));
    (state.clone(), create_router(state))
}

async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    read(response).await
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    read(response).await
}

async fn read(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_generate_success() {
    let backend = Arc::new(ScriptedBackend::new(vec![Ok(success("cat"))]));
    let (state, app) = create_test_app(&["k1"], backend.clone());

    let (status, body) = post_json(
        app,
        "/api/v1/generate",
        json!({ "prompt": "a cat", "image_size": "16:9", "seed": 7 }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["images"].as_array().unwrap().len(), 1);
    assert_eq!(body["model"], "Kwai-Kolors/Kolors");
    assert_eq!(body["parameters"]["size"], "1280x720");
    assert_eq!(body["parameters"]["step"], 20);
    assert_eq!(body["parameters"]["seed"], 7);

    assert_eq!(backend.requests()[0].size.as_deref(), Some("1280x720"));
    assert_eq!(state.load_balancer.stats().total_requests_today, 1);
}

#[tokio::test]
async fn test_generate_rejects_cfg_for_kolors() {
    let backend = Arc::new(ScriptedBackend::new(vec![]));
    let (_, app) = create_test_app(&["k1"], backend.clone());

    let (status, body) = post_json(
        app,
        "/api/v1/generate",
        json!({ "prompt": "a cat", "cfg": 3.5 }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_generate_passes_through_upstream_status() {
    let backend = Arc::new(ScriptedBackend::new(vec![status(400, "sensitive prompt")]));
    let (_, app) = create_test_app(&["k1"], backend);

    let (status, body) = post_json(app, "/api/v1/generate", json!({ "prompt": "x" })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "API error: sensitive prompt");
}

#[tokio::test]
async fn test_generate_without_capacity_is_unavailable() {
    let backend = Arc::new(ScriptedBackend::new(vec![]));
    let (state, app) = create_test_app(&["k1"], backend);
    for _ in 0..3 {
        state.load_balancer.record_failure("k1");
    }

    let (status, body) = post_json(app, "/api/v1/generate", json!({ "prompt": "x" })).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "no_available_keys");
}

#[tokio::test]
async fn test_generate_parallel_spreads_keys() {
    let backend = Arc::new(ScriptedBackend::always(Ok(success("img"))));
    let (_, app) = create_test_app(&["k1", "k2"], backend.clone());

    let (status, body) = post_json(
        app,
        "/api/v1/generate-parallel",
        json!({ "prompt": "a dog", "batch_size": 3, "seed": 100 }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["images"].as_array().unwrap().len(), 3);
    assert_eq!(body["seed"], 100);
    assert_eq!(body["inference_time"], 2.0);
    assert_eq!(body["parameters"]["batch_size"], 3);

    let mut keys = backend.keys_used();
    keys.sort();
    assert_eq!(keys, vec!["k1", "k1", "k2"]);

    let mut seeds: Vec<u64> = backend.requests().iter().filter_map(|r| r.seed).collect();
    seeds.sort();
    assert_eq!(seeds, vec![100, 101, 102]);
    assert!(backend.requests().iter().all(|r| r.n.is_none()));
}

#[tokio::test]
async fn test_generate_parallel_partial_failure_succeeds() {
    let backend = Arc::new(ScriptedBackend::with_fallback(
        vec![status(500, "boom")],
        Ok(success("img")),
    ));
    let (_, app) = create_test_app(&["k1", "k2", "k3"], backend);

    let (status, body) = post_json(
        app,
        "/api/v1/generate-parallel",
        json!({ "prompt": "a dog", "batch_size": 3 }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["images"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_generate_parallel_all_failed() {
    let backend = Arc::new(ScriptedBackend::always(status(500, "boom")));
    let (_, app) = create_test_app(&["k1", "k2"], backend);

    let (status, body) = post_json(
        app,
        "/api/v1/generate-parallel",
        json!({ "prompt": "a dog", "batch_size": 2 }),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "all_parallel_failed");
}

#[tokio::test]
async fn test_stats_and_health() {
    let backend = Arc::new(ScriptedBackend::new(vec![]));
    let (state, app) = create_test_app(&["k1", "k2"], backend);

    let (status, body) = get(app.clone(), "/api/v1/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_keys"], 2);
    assert_eq!(body["active_keys"], 2);
    assert_eq!(body["failed_keys"], 0);

    let (_, body) = get(app.clone(), "/api/v1/health").await;
    assert_eq!(body["status"], "healthy");

    for key in ["k1", "k2"] {
        for _ in 0..3 {
            state.load_balancer.record_failure(key);
        }
    }

    let (_, body) = get(app.clone(), "/api/v1/health").await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["active_keys"], 0);
    assert_eq!(body["total_keys"], 2);

    let (_, body) = get(app, "/api/v1/stats").await;
    assert_eq!(body["failed_keys"], 2);
}

#[tokio::test]
async fn test_models_catalogue() {
    let (_, app) = create_test_app(&["k1"], Arc::new(ScriptedBackend::new(vec![])));

    let (status, body) = get(app, "/api/v1/models").await;
    assert_eq!(status, StatusCode::OK);
    let models = body["models"].as_array().unwrap();
    assert_eq!(models.len(), 2);
    assert_eq!(models[1]["supports_cfg"], true);
}

#[tokio::test]
async fn test_request_echo() {
    let (_, app) = create_test_app(&["k1"], Arc::new(ScriptedBackend::new(vec![])));

    let (status, body) = post_json(
        app,
        "/api/v1/test-request",
        json!({ "prompt": "echo", "model": "Qwen/Qwen-Image", "cfg": 4.0 }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["received_data"]["model"], "Qwen/Qwen-Image");
    assert_eq!(body["received_data"]["batch_size"], 1);
}

#[tokio::test]
async fn test_single_api_leaves_key_state() {
    let backend = Arc::new(ScriptedBackend::new(vec![status(401, "bad key")]));
    let (state, app) = create_test_app(&["k1"], backend);

    let (status, body) = post_json(app, "/api/v1/test-single-api", json!({})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "error");
    assert_eq!(body["status_code"], 401);
    assert_eq!(state.load_balancer.snapshot()[0].consecutive_failures(), 0);
}

#[tokio::test]
async fn test_root_routes_and_unknown_api() {
    let (_, app) = create_test_app(&["k1"], Arc::new(ScriptedBackend::new(vec![])));

    let (status, body) = get(app.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, _) = get(app.clone(), "/").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(app.clone(), "/api/v1/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "API endpoint not found");

    let (status, _) = get(app, "/api/other").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_frontend_spa_fallback() {
    let dist = tempfile::tempdir().unwrap();
    std::fs::write(dist.path().join("index.html"), "<html>app</html>").unwrap();

    let mut settings = Settings::default();
    settings.frontend.dist_dir = dist.path().to_string_lossy().to_string();
    let backend = Arc::new(ScriptedBackend::new(vec![]));
    let state = Arc::new(AppState::new(settings, balancer(&["k1"]), backend));
    let app = create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/gallery/42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"<html>app</html>");
}
