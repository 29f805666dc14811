//! Image Generation Gateway
//!
//! Forwards image generation requests to an upstream API, spreading the
//! load over a pool of API keys with per-key quotas, failure tracking and
//! retries with exponential backoff.

pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod gateway;

pub use error::{AppError, Result};

use std::sync::Arc;

use backend::traits::ImageBackend;
use gateway::{
    load_balancer::LoadBalancer,
    retry::{RetryPolicy, RetryingCaller},
};

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Arc<config::Settings>,
    pub load_balancer: Arc<LoadBalancer>,
    pub caller: Arc<RetryingCaller>,
}

impl AppState {
    /// Wire the key pool and upstream backend together
    pub fn new(
        settings: config::Settings,
        load_balancer: Arc<LoadBalancer>,
        backend: Arc<dyn ImageBackend>,
    ) -> Self {
        let policy = RetryPolicy::from(&settings.retry);
        let caller = Arc::new(RetryingCaller::new(
            load_balancer.clone(),
            backend,
            policy,
        ));

        Self {
            settings: Arc::new(settings),
            load_balancer,
            caller,
        }
    }
}
