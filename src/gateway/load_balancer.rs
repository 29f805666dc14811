//! Load balancer spreading upstream calls across the API key pool

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::gateway::key_record::{mask_key, KeyRecord, KeyStatus};

/// Source of the current time, swappable in tests
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Snapshot of the key pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyPoolStats {
    pub total_keys: usize,
    pub active_keys: usize,
    pub rate_limited_keys: usize,
    pub failed_keys: usize,
    pub total_requests_today: u64,
    pub total_requests_this_minute: u64,
}

/// Key records in registration order plus the shared rotation cursor
struct PoolState {
    records: Vec<KeyRecord>,
    index: HashMap<String, usize>,
    cursor: usize,
}

impl PoolState {
    /// Eligible record positions, least used first. The sort is stable so
    /// equally loaded keys keep registration order.
    fn eligible_sorted(&mut self, now: DateTime<Utc>) -> Vec<usize> {
        let mut eligible: Vec<usize> = self
            .records
            .iter_mut()
            .enumerate()
            .filter_map(|(i, record)| record.is_eligible(now).then_some(i))
            .collect();

        eligible.sort_by_key(|&i| {
            let record = &self.records[i];
            (record.requests_per_day(), record.requests_per_minute())
        });
        eligible
    }

    fn record_mut(&mut self, key: &str) -> Option<&mut KeyRecord> {
        let position = *self.index.get(key)?;
        self.records.get_mut(position)
    }
}

/// Load balancer for distributing requests across API keys.
///
/// All selection and bookkeeping happens under one mutex, which is never
/// held across an await point.
pub struct LoadBalancer {
    state: Mutex<PoolState>,
    clock: Clock,
}

impl LoadBalancer {
    /// Create a new load balancer using the system clock
    pub fn new(keys: Vec<String>) -> Self {
        Self::with_clock(keys, Arc::new(Utc::now))
    }

    /// Create a new load balancer with a custom time source
    pub fn with_clock(keys: Vec<String>, clock: Clock) -> Self {
        let mut records = Vec::with_capacity(keys.len());
        let mut index = HashMap::with_capacity(keys.len());

        for key in keys {
            let key = key.trim().to_string();
            if key.is_empty() {
                continue;
            }
            if index.contains_key(&key) {
                warn!(key = %mask_key(&key), "Duplicate API key ignored");
                continue;
            }
            index.insert(key.clone(), records.len());
            records.push(KeyRecord::new(key));
        }

        Self {
            state: Mutex::new(PoolState {
                records,
                index,
                cursor: 0,
            }),
            clock,
        }
    }

    /// Number of registered keys
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pick one key for a request.
    ///
    /// `None` means every key is failed or rate limited.
    pub fn select_key(&self) -> Option<String> {
        let now = (self.clock)();
        let mut state = self.state.lock();

        let eligible = state.eligible_sorted(now);
        if eligible.is_empty() {
            warn!("No available API keys");
            return None;
        }

        let position = eligible[state.cursor % eligible.len()];
        state.cursor = (state.cursor + 1) % eligible.len();

        let key = state.records[position].key().to_string();
        debug!(key = %mask_key(&key), eligible = eligible.len(), "Selected API key");
        Some(key)
    }

    /// Pick up to `count` keys for parallel requests.
    ///
    /// Keys repeat when `count` exceeds the number of eligible keys. An
    /// empty result means no key is available at all.
    pub fn select_keys(&self, count: usize) -> Vec<String> {
        let now = (self.clock)();
        let mut state = self.state.lock();

        let eligible = state.eligible_sorted(now);
        if eligible.is_empty() {
            warn!("No available API keys");
            return Vec::new();
        }

        let budget = count.max(eligible.len() * 2);
        let start = state.cursor;
        let mut selected = Vec::with_capacity(count);

        for step in 0..budget {
            if selected.len() >= count {
                break;
            }
            let position = eligible[(start + step) % eligible.len()];
            let record = &mut state.records[position];
            if record.is_eligible(now) {
                selected.push(record.key().to_string());
            }
        }

        state.cursor = (state.cursor + selected.len()) % eligible.len();

        debug!(
            requested = count,
            selected = selected.len(),
            eligible = eligible.len(),
            "Selected API keys for parallel requests"
        );
        selected
    }

    /// Record a successful upstream request. Unknown keys are ignored.
    pub fn record_success(&self, key: &str) {
        let now = (self.clock)();
        if let Some(record) = self.state.lock().record_mut(key) {
            record.record_request(now);
        }
    }

    /// Record a failed upstream request. Unknown keys are ignored.
    pub fn record_failure(&self, key: &str) {
        let now = (self.clock)();
        if let Some(record) = self.state.lock().record_mut(key) {
            record.record_failure(now);
        }
    }

    /// Cached status of one key after rolling its windows forward.
    ///
    /// Failed keys past their cooldown read as active. A key that was rate
    /// limited keeps that status until its next recorded request, even once
    /// its window has rolled over.
    pub fn key_status(&self, key: &str) -> Option<KeyStatus> {
        let now = (self.clock)();
        let mut state = self.state.lock();
        let record = state.record_mut(key)?;
        record.refresh_windows(now);
        Some(record.status())
    }

    /// Copy of every record in registration order, as last refreshed
    pub fn snapshot(&self) -> Vec<KeyRecord> {
        self.state.lock().records.clone()
    }

    /// Aggregate statistics from each record's cached state.
    ///
    /// Records are not refreshed here, so a key can show as failed or rate
    /// limited until the next selection touches it.
    pub fn stats(&self) -> KeyPoolStats {
        let state = self.state.lock();
        let count = |status: KeyStatus| {
            state
                .records
                .iter()
                .filter(|record| record.status() == status)
                .count()
        };

        KeyPoolStats {
            total_keys: state.records.len(),
            active_keys: count(KeyStatus::Active),
            rate_limited_keys: count(KeyStatus::RateLimited),
            failed_keys: count(KeyStatus::Failed),
            total_requests_today: state
                .records
                .iter()
                .map(|record| u64::from(record.requests_per_day()))
                .sum(),
            total_requests_this_minute: state
                .records
                .iter()
                .map(|record| u64::from(record.requests_per_minute()))
                .sum(),
        }
    }
}
