//! Router assembly

use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::api::handlers;
use crate::config::CorsConfig;
use crate::AppState;

/// Build the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/generate", post(handlers::generate_image))
        .route("/generate-parallel", post(handlers::generate_parallel))
        .route("/models", get(handlers::list_models))
        .route("/stats", get(handlers::get_stats))
        .route("/health", get(handlers::api_health))
        .route("/test-request", post(handlers::test_request))
        .route("/test-single-api", post(handlers::test_single_api))
        .fallback(handlers::api_not_found);

    let cors = cors_layer(&state.settings.cors);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::root_health))
        .nest("/api/v1", api)
        .fallback(handlers::frontend)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::mirror_request())
}
