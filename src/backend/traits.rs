//! Common traits and types for the upstream image generation API

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Body of one upstream generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamRequest {
    /// Model identifier, e.g. `Kwai-Kolors/Kolors`
    pub model: String,

    /// The prompt to generate images from
    pub prompt: String,

    /// Pixel size such as `1024x1024`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    /// Number of inference steps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,

    /// Number of images to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,

    /// Random seed for reproducibility
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Negative prompt (things to avoid)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
}

/// Generated image data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImage {
    /// URL to the image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Base64 encoded image data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b64_json: Option<String>,
}

/// Normalized result of a successful generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub images: Vec<GeneratedImage>,
    pub seed: u64,
    /// Seconds, as reported by the upstream or measured locally
    pub inference_time: f64,
    pub model: String,
}

/// Why a single upstream attempt did not produce a result
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamError {
    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("upstream request timed out: {0}")]
    Timeout(String),

    #[error("upstream transport error: {0}")]
    Transport(String),

    #[error("failed to decode upstream response: {0}")]
    Decode(String),
}

/// Trait for the image generation API the gateway forwards to
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Get the backend name
    fn name(&self) -> &str;

    /// Issue one generation call authenticated with `api_key`
    async fn generate(
        &self,
        api_key: &str,
        request: &UpstreamRequest,
    ) -> Result<GenerationResult, UpstreamError>;
}
