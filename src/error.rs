//! Common error types for the image generation gateway

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Every key is failed or rate limited at selection time
    #[error("No available API keys. Please try again later.")]
    NoKeysAvailable,

    /// Non-retryable upstream answer, status and body preserved
    #[error("API error: {body}")]
    Upstream { status: u16, body: String },

    #[error("Failed to generate image after multiple retries")]
    RetriesExhausted,

    #[error("All parallel requests failed")]
    AllParallelFailed,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status this error is surfaced with
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Config(_) | AppError::Io(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Json(_) | AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,
            AppError::NoKeysAvailable | AppError::RetriesExhausted => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            AppError::AllParallelFailed => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

/// Error response format (OpenAI compatible)
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
    pub code: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (error_type, code) = match &self {
            AppError::Config(_) | AppError::Io(_) | AppError::Internal(_) => ("server_error", None),
            AppError::Json(_) => ("invalid_request_error", Some("invalid_json")),
            AppError::HttpClient(_) => ("upstream_error", None),
            AppError::NoKeysAvailable => ("server_error", Some("no_available_keys")),
            AppError::Upstream { .. } => ("upstream_error", Some("upstream_rejected")),
            AppError::RetriesExhausted => ("server_error", Some("retries_exhausted")),
            AppError::AllParallelFailed => ("server_error", Some("all_parallel_failed")),
            AppError::InvalidRequest(_) => ("invalid_request_error", None),
            AppError::Timeout(_) => ("timeout_error", None),
        };

        let status = self.status_code();
        let body = Json(ErrorResponse {
            error: ErrorDetail {
                message: self.to_string(),
                r#type: error_type.to_string(),
                code: code.map(|c| c.to_string()),
            },
        });

        (status, body).into_response()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
