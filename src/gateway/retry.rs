//! Upstream calls with key rotation and exponential backoff

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::backend::traits::{GenerationResult, ImageBackend, UpstreamError, UpstreamRequest};
use crate::config::RetryConfig;
use crate::error::{AppError, Result};
use crate::gateway::key_record::mask_key;
use crate::gateway::load_balancer::LoadBalancer;

/// Backoff schedule for one logical call
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier,
        }
    }
}

impl RetryPolicy {
    /// Sleep after the failed attempt `attempt` (zero based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.mul_f64(self.multiplier.powi(attempt as i32))
    }
}

/// Runs upstream calls, picking keys from the load balancer and reporting
/// every outcome back to it.
pub struct RetryingCaller {
    balancer: Arc<LoadBalancer>,
    backend: Arc<dyn ImageBackend>,
    policy: RetryPolicy,
}

impl RetryingCaller {
    pub fn new(
        balancer: Arc<LoadBalancer>,
        backend: Arc<dyn ImageBackend>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            balancer,
            backend,
            policy,
        }
    }

    pub fn balancer(&self) -> &Arc<LoadBalancer> {
        &self.balancer
    }

    pub fn backend(&self) -> &Arc<dyn ImageBackend> {
        &self.backend
    }

    /// Generate with a fresh key per attempt.
    ///
    /// 429s, timeouts and transport errors back off and retry, 401s retry
    /// at once, any other upstream status fails immediately.
    pub async fn call(&self, request: &UpstreamRequest) -> Result<GenerationResult> {
        let max_retries = self.policy.max_retries;

        for attempt in 0..max_retries {
            let key = self
                .balancer
                .select_key()
                .ok_or(AppError::NoKeysAvailable)?;

            debug!(key = %mask_key(&key), attempt, "Calling upstream");

            match self.backend.generate(&key, request).await {
                Ok(result) => {
                    self.balancer.record_success(&key);
                    info!(
                        key = %mask_key(&key),
                        attempt,
                        images = result.images.len(),
                        "Upstream generation succeeded"
                    );
                    return Ok(result);
                }
                Err(UpstreamError::Status { status: 401, .. }) => {
                    self.balancer.record_failure(&key);
                    error!(key = %mask_key(&key), attempt, "Unauthorized API key");
                }
                Err(UpstreamError::Status { status, body }) if status != 429 => {
                    self.balancer.record_failure(&key);
                    error!(key = %mask_key(&key), status, body = %body, "Upstream API error");
                    return Err(AppError::Upstream { status, body });
                }
                Err(err) => {
                    self.balancer.record_failure(&key);
                    warn!(key = %mask_key(&key), attempt, error = %err, "Retryable upstream failure");

                    if attempt + 1 < max_retries {
                        let delay = self.policy.delay_for(attempt);
                        debug!(delay_ms = delay.as_millis() as u64, "Backing off before retry");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(AppError::RetriesExhausted)
    }

    /// Single attempt with a key chosen by the caller, used for parallel
    /// batches where keys are assigned up front.
    pub async fn call_with_key(
        &self,
        key: &str,
        request: &UpstreamRequest,
    ) -> Result<GenerationResult> {
        match self.backend.generate(key, request).await {
            Ok(result) => {
                self.balancer.record_success(key);
                Ok(result)
            }
            Err(err) => {
                self.balancer.record_failure(key);
                error!(key = %mask_key(key), error = %err, "Upstream call failed");
                Err(err.into())
            }
        }
    }
}

impl From<UpstreamError> for AppError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Status { status, body } => AppError::Upstream { status, body },
            UpstreamError::Timeout(message) => AppError::Timeout(message),
            UpstreamError::Transport(message) | UpstreamError::Decode(message) => {
                AppError::Upstream {
                    status: 502,
                    body: message,
                }
            }
        }
    }
}
