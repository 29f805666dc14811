//! HTTP handlers for the image generation API

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::types::{ImageGenerationRequest, ImageGenerationResponse};
use crate::backend::traits::{UpstreamError, UpstreamRequest};
use crate::error::{AppError, Result};
use crate::gateway::batch::{plan_batch, run_batch};
use crate::gateway::key_record::mask_key;
use crate::AppState;

/// `POST /api/v1/generate`
pub async fn generate_image(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ImageGenerationRequest>,
) -> Result<Json<ImageGenerationResponse>> {
    request.validate()?;

    let upstream = request.to_upstream();
    let generation_id = Uuid::new_v4();
    info!(%generation_id, model = %upstream.model, n = ?upstream.n, "Generating image");

    let result = state.caller.call(&upstream).await?;

    Ok(Json(ImageGenerationResponse {
        images: result.images,
        seed: result.seed,
        inference_time: result.inference_time,
        model: request.model.id().to_string(),
        parameters: serde_json::to_value(&upstream)?,
    }))
}

/// `POST /api/v1/generate-parallel`
///
/// One upstream call per image, each on its own key where possible.
pub async fn generate_parallel(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ImageGenerationRequest>,
) -> Result<Json<ImageGenerationResponse>> {
    request.validate()?;

    let batch_size = request.batch_size as usize;
    let keys = state.load_balancer.select_keys(batch_size);
    if keys.is_empty() {
        return Err(AppError::NoKeysAvailable);
    }

    let generation_id = Uuid::new_v4();
    info!(
        %generation_id,
        batch_size,
        distinct_keys = keys.len(),
        "Starting parallel generation"
    );

    let plan = plan_batch(&request.to_upstream(), request.seed, &keys, batch_size);
    let combined = run_batch(&state.caller, plan).await.combine()?;

    Ok(Json(ImageGenerationResponse {
        images: combined.images,
        seed: request.seed.unwrap_or(0),
        inference_time: combined.inference_time,
        model: request.model.id().to_string(),
        parameters: serde_json::to_value(&request)?,
    }))
}

/// `GET /api/v1/models`
pub async fn list_models() -> Json<Value> {
    Json(json!({
        "models": [
            {
                "id": "Kwai-Kolors/Kolors",
                "name": "Kolors",
                "description": "High-quality image generation model",
                "supported_sizes": ["1024x1024", "1328x1328", "1664x928", "928x1664"]
            },
            {
                "id": "Qwen/Qwen-Image",
                "name": "Qwen Image",
                "description": "Advanced image generation with CFG support",
                "supported_sizes": ["1328x1328", "1664x928", "928x1664", "1280x720", "720x1280"],
                "supports_cfg": true
            }
        ]
    }))
}

/// `GET /api/v1/stats`
pub async fn get_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.load_balancer.stats())
}

/// `GET /api/v1/health`: degraded when no key is active
pub async fn api_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let stats = state.load_balancer.stats();
    let status = if stats.active_keys > 0 {
        "healthy"
    } else {
        "degraded"
    };

    Json(json!({
        "status": status,
        "active_keys": stats.active_keys,
        "total_keys": stats.total_keys,
        "timestamp": unix_timestamp(),
    }))
}

/// `POST /api/v1/test-request`: validate and echo
pub async fn test_request(Json(request): Json<ImageGenerationRequest>) -> Result<Json<Value>> {
    request.validate()?;

    Ok(Json(json!({
        "status": "success",
        "message": "Request data is valid",
        "received_data": request,
    })))
}

/// `POST /api/v1/test-single-api`
///
/// Sends one fixed request upstream. Key state is left untouched.
pub async fn test_single_api(State(state): State<Arc<AppState>>) -> Json<Value> {
    let Some(key) = state.load_balancer.select_key() else {
        return Json(json!({ "status": "error", "message": "No API keys available" }));
    };

    let test_body = UpstreamRequest {
        model: "Kwai-Kolors/Kolors".to_string(),
        prompt: "a simple test image".to_string(),
        size: Some("1024x1024".to_string()),
        step: None,
        n: None,
        seed: None,
        negative_prompt: None,
    };

    info!(
        key = %mask_key(&key),
        backend = %state.caller.backend().name(),
        "Testing upstream API"
    );

    let report = match state.caller.backend().generate(&key, &test_body).await {
        Ok(result) => json!({
            "status": "success",
            "status_code": 200,
            "response": result,
            "request_sent": test_body,
        }),
        Err(UpstreamError::Status { status, body }) => json!({
            "status": "error",
            "status_code": status,
            "response": body,
            "request_sent": test_body,
        }),
        Err(e) => json!({
            "status": "error",
            "message": e.to_string(),
            "request_sent": test_body,
        }),
    };

    Json(report)
}

/// `GET /health`
pub async fn root_health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "message": "Image generation gateway is running",
    }))
}

/// `GET /`
pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "Image generation gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Unknown API route
pub async fn api_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "detail": "API endpoint not found" })),
    )
        .into_response()
}

/// Everything outside the API: the built frontend, with client-side
/// routes falling back to `index.html`.
pub async fn frontend(State(state): State<Arc<AppState>>, request: Request<Body>) -> Response {
    if request.uri().path().starts_with("/api/") {
        return api_not_found().await;
    }

    let dist = Path::new(&state.settings.frontend.dist_dir);
    if !dist.is_dir() {
        return (StatusCode::NOT_FOUND, Json(json!({ "detail": "Not Found" }))).into_response();
    }

    let service = ServeDir::new(dist).fallback(ServeFile::new(dist.join("index.html")));
    match service.oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to serve frontend file");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn unix_timestamp() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}
