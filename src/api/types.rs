//! Request and response types of the public HTTP API

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::backend::traits::{GeneratedImage, UpstreamRequest};
use crate::error::{AppError, Result};

pub const MAX_PROMPT_CHARS: usize = 2000;
pub const MAX_BATCH_SIZE: u32 = 10;
pub const MAX_SEED: u64 = 9_999_999_999;
pub const MAX_INFERENCE_STEPS: u32 = 100;

/// Aspect ratios accepted in `image_size`
pub const ALLOWED_RATIOS: [&str; 6] = ["1:1", "1:2", "3:2", "3:4", "16:9", "9:16"];

/// Pixel sizes accepted in `image_size`
pub const ALLOWED_SIZES: [&str; 8] = [
    "1024x1024",
    "1328x1328",
    "1664x928",
    "928x1664",
    "1280x720",
    "720x1280",
    "1536x640",
    "640x1536",
];

/// Models the upstream serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageModel {
    #[default]
    #[serde(rename = "Kwai-Kolors/Kolors")]
    Kolors,
    #[serde(rename = "Qwen/Qwen-Image")]
    QwenImage,
}

impl ImageModel {
    pub fn id(&self) -> &'static str {
        match self {
            ImageModel::Kolors => "Kwai-Kolors/Kolors",
            ImageModel::QwenImage => "Qwen/Qwen-Image",
        }
    }

    /// Qwen models are the only ones taking a `cfg` value
    pub fn is_qwen(&self) -> bool {
        self.id().starts_with("Qwen/")
    }
}

/// Map an aspect ratio to the pixel size the upstream expects.
/// Pixel sizes pass through unchanged.
pub fn convert_image_size(size: &str) -> &str {
    match size {
        "1:1" => "1024x1024",
        "1:2" => "640x1536",
        "3:2" => "1664x928",
        "3:4" => "928x1664",
        "16:9" => "1280x720",
        "9:16" => "720x1280",
        other => other,
    }
}

fn default_image_size() -> String {
    "1024x1024".to_string()
}

fn default_batch_size() -> u32 {
    1
}

fn default_inference_steps() -> u32 {
    20
}

fn default_guidance_scale() -> f64 {
    7.5
}

/// Image generation request accepted by `/generate` and `/generate-parallel`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageGenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default)]
    pub model: ImageModel,
    #[serde(default = "default_image_size")]
    pub image_size: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_inference_steps")]
    pub num_inference_steps: u32,
    #[serde(default = "default_guidance_scale")]
    pub guidance_scale: f64,
    #[serde(default)]
    pub cfg: Option<f64>,
    /// Reference image, base64 or data URL
    #[serde(default)]
    pub image: Option<String>,
}

impl ImageGenerationRequest {
    /// Check field ranges and cross-field rules
    pub fn validate(&self) -> Result<()> {
        let prompt_len = self.prompt.chars().count();
        if prompt_len == 0 || prompt_len > MAX_PROMPT_CHARS {
            return Err(invalid(format!(
                "prompt must be between 1 and {} characters",
                MAX_PROMPT_CHARS
            )));
        }

        if let Some(negative) = &self.negative_prompt {
            if negative.chars().count() > MAX_PROMPT_CHARS {
                return Err(invalid(format!(
                    "negative_prompt must be at most {} characters",
                    MAX_PROMPT_CHARS
                )));
            }
        }

        if !ALLOWED_RATIOS.contains(&self.image_size.as_str())
            && !ALLOWED_SIZES.contains(&self.image_size.as_str())
        {
            return Err(invalid(format!(
                "Image size must be one of {:?} or {:?}",
                ALLOWED_RATIOS, ALLOWED_SIZES
            )));
        }

        if self.batch_size < 1 || self.batch_size > MAX_BATCH_SIZE {
            return Err(invalid(format!(
                "batch_size must be between 1 and {}",
                MAX_BATCH_SIZE
            )));
        }

        if matches!(self.seed, Some(seed) if seed > MAX_SEED) {
            return Err(invalid(format!("seed must be between 0 and {}", MAX_SEED)));
        }

        if self.num_inference_steps < 1 || self.num_inference_steps > MAX_INFERENCE_STEPS {
            return Err(invalid(format!(
                "num_inference_steps must be between 1 and {}",
                MAX_INFERENCE_STEPS
            )));
        }

        if !(0.0..=20.0).contains(&self.guidance_scale) {
            return Err(invalid("guidance_scale must be between 0 and 20".to_string()));
        }

        if let Some(cfg) = self.cfg {
            if !(0.1..=20.0).contains(&cfg) {
                return Err(invalid("cfg must be between 0.1 and 20".to_string()));
            }
            if !self.model.is_qwen() {
                return Err(invalid(
                    "CFG parameter is only available for Qwen models".to_string(),
                ));
            }
        }

        if let Some(image) = &self.image {
            if !is_valid_base64(image) {
                return Err(invalid("image must be base64 encoded".to_string()));
            }
        }

        Ok(())
    }

    /// Body for a single upstream call producing `batch_size` images
    pub fn to_upstream(&self) -> UpstreamRequest {
        UpstreamRequest {
            model: self.model.id().to_string(),
            prompt: self.prompt.clone(),
            size: Some(convert_image_size(&self.image_size).to_string()),
            step: Some(self.num_inference_steps),
            n: (self.batch_size > 1).then_some(self.batch_size),
            seed: self.seed,
            negative_prompt: self
                .negative_prompt
                .clone()
                .filter(|negative| !negative.is_empty()),
        }
    }
}

fn invalid(message: String) -> AppError {
    AppError::InvalidRequest(message)
}

/// Accepts raw base64 or a `data:image/...;base64,` URL
fn is_valid_base64(data: &str) -> bool {
    let payload = data.rsplit(',').next().unwrap_or(data);
    STANDARD.decode(payload.trim()).is_ok()
}

/// Response of the generation endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageGenerationResponse {
    pub images: Vec<GeneratedImage>,
    pub seed: u64,
    pub inference_time: f64,
    pub model: String,
    pub parameters: serde_json::Value,
}
