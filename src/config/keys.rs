//! Loading the upstream API key pool from newline-delimited files

use std::path::Path;
use tracing::{error, info, warn};

use crate::config::KeysConfig;

/// Read one key per line, trimming whitespace and skipping blank lines.
///
/// A missing or unreadable file yields an empty list; the caller decides
/// whether to try another source.
pub fn load_api_keys_from_file<P: AsRef<Path>>(path: P) -> Vec<String> {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let keys: Vec<String> = contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from)
                .collect();
            info!(path = %path.display(), count = keys.len(), "Loaded API keys");
            keys
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            error!(path = %path.display(), "API keys file not found");
            Vec::new()
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Error loading API keys");
            Vec::new()
        }
    }
}

/// Resolve the key pool: first candidate file with at least one key wins,
/// otherwise fall back to the single placeholder key.
pub fn resolve_api_keys(config: &KeysConfig) -> Vec<String> {
    for path in &config.paths {
        let keys = load_api_keys_from_file(path);
        if !keys.is_empty() {
            return keys;
        }
    }

    warn!("No API keys found, using placeholder key for development");
    vec![config.fallback_key.clone()]
}
