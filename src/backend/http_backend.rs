//! HTTP client for the SiliconFlow image generation API

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Instant;
use tracing::debug;

use crate::backend::traits::{
    GeneratedImage, GenerationResult, ImageBackend, UpstreamError, UpstreamRequest,
};
use crate::config::UpstreamConfig;
use crate::error::{AppError, Result};

/// Upstream backend reached over HTTPS with a bearer key per call
pub struct HttpBackend {
    name: String,
    client: Client,
    generations_url: String,
}

/// Success body of the generations endpoint
#[derive(Debug, Deserialize)]
struct ApiGenerateResponse {
    #[serde(default)]
    images: Vec<GeneratedImage>,
    #[serde(default)]
    seed: Option<u64>,
    #[serde(default)]
    timings: Option<ApiTimings>,
}

#[derive(Debug, Deserialize)]
struct ApiTimings {
    #[serde(default)]
    inference: Option<f64>,
}

impl HttpBackend {
    /// Create a new HTTP backend from configuration
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            name: "siliconflow".to_string(),
            client,
            generations_url: format!(
                "{}/images/generations",
                config.base_url.trim_end_matches('/')
            ),
        })
    }

    pub fn generations_url(&self) -> &str {
        &self.generations_url
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout(err.to_string())
        } else if err.is_decode() {
            UpstreamError::Decode(err.to_string())
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl ImageBackend for HttpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        api_key: &str,
        request: &UpstreamRequest,
    ) -> std::result::Result<GenerationResult, UpstreamError> {
        debug!(backend = %self.name, model = %request.model, "Sending generate request");

        let started = Instant::now();
        let response = self
            .client
            .post(&self.generations_url)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await?;
        let elapsed = started.elapsed().as_secs_f64();

        let status = response.status();
        if status != StatusCode::OK {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("failed to read error body: {}", e));
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let api_response: ApiGenerateResponse = response.json().await?;

        Ok(GenerationResult {
            images: api_response.images,
            seed: api_response.seed.unwrap_or(0),
            inference_time: api_response
                .timings
                .and_then(|t| t.inference)
                .unwrap_or(elapsed),
            model: request.model.clone(),
        })
    }
}
