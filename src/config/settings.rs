//! Application settings and configuration management

use crate::error::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable that overrides the configuration file path
pub const CONFIG_PATH_ENV: &str = "IMAGEGEN_CONFIG";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub retry: RetryConfig,
    pub keys: KeysConfig,
    pub cors: CorsConfig,
    pub frontend: FrontendConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

/// Upstream image generation API
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.siliconflow.cn/v1".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Retry/backoff policy for upstream calls
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_multiplier() -> f64 {
    2.0
}

/// Where the API key pool comes from
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KeysConfig {
    /// Candidate key files, tried in order
    #[serde(default = "default_key_paths")]
    pub paths: Vec<String>,
    #[serde(default = "default_fallback_key")]
    pub fallback_key: String,
}

fn default_key_paths() -> Vec<String> {
    vec!["keys.txt".to_string(), "../keys.txt".to_string()]
}

fn default_fallback_key() -> String {
    "sk-dummy-key-for-development".to_string()
}

/// CORS configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
        "http://127.0.0.1:3000".to_string(),
        "http://127.0.0.1:5173".to_string(),
    ]
}

/// Built frontend served for non-API paths
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FrontendConfig {
    #[serde(default = "default_dist_dir")]
    pub dist_dir: String,
}

fn default_dist_dir() -> String {
    "../frontend/dist".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Settings {
    /// Load settings from the configuration file and environment variables
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config/default".to_string());
        Self::load_from_path(path)
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port() as i64)?
            .set_default("upstream.base_url", default_base_url())?
            .set_default("upstream.timeout_secs", default_timeout_secs() as i64)?
            .set_default("retry.max_retries", default_max_retries() as i64)?
            .set_default("retry.base_delay_ms", default_base_delay_ms() as i64)?
            .set_default("retry.multiplier", default_multiplier())?
            .set_default("keys.paths", default_key_paths())?
            .set_default("keys.fallback_key", default_fallback_key())?
            .set_default("cors.allowed_origins", default_allowed_origins())?
            .set_default("frontend.dist_dir", default_dist_dir())?
            .set_default("logging.level", default_log_level())?
            .set_default("logging.format", default_log_format())?
            .add_source(File::with_name(path.as_ref().to_str().unwrap_or("config/default")).required(false))
            // Override with environment variables (IMAGEGEN__RETRY__MAX_RETRIES=5)
            .add_source(
                Environment::with_prefix("IMAGEGEN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("cors.allowed_origins")
                    .with_list_parse_key("keys.paths"),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(invalid("Server port cannot be 0"));
        }
        if self.upstream.base_url.trim().is_empty() {
            return Err(invalid("Upstream base_url cannot be empty"));
        }
        if self.upstream.timeout_secs == 0 {
            return Err(invalid("upstream.timeout_secs must be at least 1"));
        }
        if self.retry.max_retries == 0 {
            return Err(invalid("retry.max_retries must be at least 1"));
        }
        if self.retry.multiplier < 1.0 {
            return Err(invalid("retry.multiplier must be >= 1.0"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> AppError {
    AppError::Config(config::ConfigError::Message(message.to_string()))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
            },
            upstream: UpstreamConfig {
                base_url: default_base_url(),
                timeout_secs: default_timeout_secs(),
            },
            retry: RetryConfig {
                max_retries: default_max_retries(),
                base_delay_ms: default_base_delay_ms(),
                multiplier: default_multiplier(),
            },
            keys: KeysConfig {
                paths: default_key_paths(),
                fallback_key: default_fallback_key(),
            },
            cors: CorsConfig {
                allowed_origins: default_allowed_origins(),
            },
            frontend: FrontendConfig {
                dist_dir: default_dist_dir(),
            },
            logging: LoggingConfig {
                level: default_log_level(),
                format: default_log_format(),
            },
        }
    }
}
