//! Configuration module - Settings and API key pool loading

pub mod keys;
pub mod settings;

pub use keys::{load_api_keys_from_file, resolve_api_keys};
pub use settings::{
    CorsConfig, FrontendConfig, KeysConfig, LoggingConfig, RetryConfig, ServerConfig, Settings,
    UpstreamConfig,
};
