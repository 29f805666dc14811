//! Per-key usage and health state for the upstream API key pool

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

/// Upstream image quota per key per minute
pub const REQUESTS_PER_MINUTE_LIMIT: u32 = 2;
/// Upstream image quota per key per day
pub const REQUESTS_PER_DAY_LIMIT: u32 = 400;
/// Consecutive failures that take a key out of rotation
pub const FAILURE_THRESHOLD: u32 = 3;
/// Seconds a failed key sits out before it is trusted again
pub const FAILURE_COOLDOWN_SECS: i64 = 300;

const SECONDS_PER_MINUTE: i64 = 60;
const SECONDS_PER_DAY: i64 = 86_400;

/// Cached health of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    Active,
    RateLimited,
    Failed,
}

/// Usage and failure tracking for one API key.
///
/// `status` is a cached view. Every operation that depends on it calls
/// [`KeyRecord::refresh_windows`] first, so windows roll over and failed
/// keys recover lazily on access.
#[derive(Debug, Clone)]
pub struct KeyRecord {
    key: String,
    status: KeyStatus,
    requests_per_minute: u32,
    requests_per_day: u32,
    last_request_time: Option<DateTime<Utc>>,
    minute_window: i64,
    day_window: i64,
    consecutive_failures: u32,
    last_failure_time: Option<DateTime<Utc>>,
}

impl KeyRecord {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            status: KeyStatus::Active,
            requests_per_minute: 0,
            requests_per_day: 0,
            last_request_time: None,
            minute_window: 0,
            day_window: 0,
            consecutive_failures: 0,
            last_failure_time: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Cached status as of the last refresh
    pub fn status(&self) -> KeyStatus {
        self.status
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }

    pub fn requests_per_day(&self) -> u32 {
        self.requests_per_day
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_request_time(&self) -> Option<DateTime<Utc>> {
        self.last_request_time
    }

    pub fn last_failure_time(&self) -> Option<DateTime<Utc>> {
        self.last_failure_time
    }

    /// Roll minute/day counters into the current window and lift an expired
    /// failure cooldown.
    pub fn refresh_windows(&mut self, now: DateTime<Utc>) {
        let timestamp = now.timestamp();
        let minute = timestamp.div_euclid(SECONDS_PER_MINUTE);
        let day = timestamp.div_euclid(SECONDS_PER_DAY);

        if minute != self.minute_window {
            self.requests_per_minute = 0;
            self.minute_window = minute;
        }

        if day != self.day_window {
            self.requests_per_day = 0;
            self.day_window = day;
        }

        if self.status == KeyStatus::Failed {
            let cooled_down = self
                .last_failure_time
                .map_or(true, |at| now - at > Duration::seconds(FAILURE_COOLDOWN_SECS));
            if cooled_down {
                self.status = KeyStatus::Active;
                self.consecutive_failures = 0;
                info!(key = %mask_key(&self.key), "API key recovered after cooldown");
            }
        }
    }

    /// Whether the key may carry another request right now.
    ///
    /// Hitting a quota flips the cached status to `RateLimited`.
    pub fn is_eligible(&mut self, now: DateTime<Utc>) -> bool {
        self.refresh_windows(now);

        if self.status == KeyStatus::Failed {
            return false;
        }

        if self.quota_reached() {
            self.status = KeyStatus::RateLimited;
            return false;
        }

        true
    }

    /// Count a successful upstream request against this key
    pub fn record_request(&mut self, now: DateTime<Utc>) {
        self.refresh_windows(now);
        self.requests_per_minute += 1;
        self.requests_per_day += 1;
        self.last_request_time = Some(now);
        self.consecutive_failures = 0;

        self.status = if self.quota_reached() {
            KeyStatus::RateLimited
        } else {
            KeyStatus::Active
        };
    }

    /// Count a failed upstream request against this key
    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.consecutive_failures += 1;
        self.last_failure_time = Some(now);

        if self.consecutive_failures >= FAILURE_THRESHOLD {
            if self.status != KeyStatus::Failed {
                warn!(
                    key = %mask_key(&self.key),
                    failures = self.consecutive_failures,
                    "API key marked failed after consecutive failures"
                );
            }
            self.status = KeyStatus::Failed;
        }
    }

    fn quota_reached(&self) -> bool {
        self.requests_per_minute >= REQUESTS_PER_MINUTE_LIMIT
            || self.requests_per_day >= REQUESTS_PER_DAY_LIMIT
    }
}

/// Shorten a key for logs: first 10 characters followed by `...`
pub fn mask_key(key: &str) -> String {
    let prefix: String = key.chars().take(10).collect();
    format!("{}...", prefix)
}
