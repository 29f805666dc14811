//! Backend module - Upstream API trait and HTTP client

pub mod http_backend;
pub mod traits;
