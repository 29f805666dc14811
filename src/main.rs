//! Main entry point for the image generation gateway

use imagegen_gateway::{
    api,
    backend::http_backend::HttpBackend,
    config::{resolve_api_keys, LoggingConfig, Settings},
    gateway::load_balancer::LoadBalancer,
    AppState,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::load()?;

    init_logging(&settings.logging);

    info!("Starting image generation gateway");
    info!(
        "Loaded configuration: server={}:{}",
        settings.server.host, settings.server.port
    );

    // Initialize key pool
    let keys = resolve_api_keys(&settings.keys);
    let load_balancer = Arc::new(LoadBalancer::new(keys));
    if load_balancer.is_empty() {
        warn!("API key pool is empty, every generation will fail");
    }
    info!(keys = load_balancer.len(), "Initialized API key pool");

    let backend = Arc::new(HttpBackend::new(&settings.upstream)?);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);

    // Create application state
    let app_state = Arc::new(AppState::new(settings, load_balancer, backend));

    // Build the router
    let app = api::routes::create_router(app_state);

    info!("Server listening on {}", addr);

    // Start the server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
