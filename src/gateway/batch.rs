//! Parallel batch generation: one upstream call per image, each on its own key

use futures::future::join_all;
use tracing::{error, info};

use crate::backend::traits::{GeneratedImage, GenerationResult, UpstreamRequest};
use crate::error::{AppError, Result};
use crate::gateway::retry::RetryingCaller;

/// One planned upstream call of a batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    pub key: String,
    pub request: UpstreamRequest,
}

/// Results of a batch, in plan order
#[derive(Debug)]
pub struct BatchOutcome {
    pub results: Vec<GenerationResult>,
    pub failures: Vec<AppError>,
}

/// Images merged from the successful calls of a batch
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedBatch {
    pub images: Vec<GeneratedImage>,
    /// Mean over successful calls, in seconds
    pub inference_time: f64,
    pub succeeded: usize,
    pub failed: usize,
}

/// Split a multi-image request into `batch_size` single-image calls.
///
/// Keys are reused round-robin when fewer keys than images were handed
/// out. Seeds count up from `seed` (or 0); a zero seed is left unset so the
/// upstream picks one.
pub fn plan_batch(
    base: &UpstreamRequest,
    seed: Option<u64>,
    keys: &[String],
    batch_size: usize,
) -> Vec<BatchItem> {
    if keys.is_empty() {
        return Vec::new();
    }

    let first_seed = seed.unwrap_or(0);
    (0..batch_size)
        .map(|i| {
            let mut request = base.clone();
            request.n = None;
            request.seed = Some(first_seed + i as u64).filter(|s| *s != 0);
            BatchItem {
                key: keys[i % keys.len()].clone(),
                request,
            }
        })
        .collect()
}

/// Run every planned call concurrently. A failing call never cancels its
/// siblings.
pub async fn run_batch(caller: &RetryingCaller, items: Vec<BatchItem>) -> BatchOutcome {
    let calls = items
        .iter()
        .map(|item| caller.call_with_key(&item.key, &item.request));

    let mut results = Vec::new();
    let mut failures = Vec::new();
    for outcome in join_all(calls).await {
        match outcome {
            Ok(result) => results.push(result),
            Err(e) => {
                error!(error = %e, "Parallel generation failed");
                failures.push(e);
            }
        }
    }

    BatchOutcome { results, failures }
}

impl BatchOutcome {
    /// Merge successful results; an error only when every call failed
    pub fn combine(self) -> Result<CombinedBatch> {
        if self.results.is_empty() {
            return Err(AppError::AllParallelFailed);
        }

        let succeeded = self.results.len();
        let failed = self.failures.len();
        let total_time: f64 = self.results.iter().map(|r| r.inference_time).sum();
        let images = self
            .results
            .into_iter()
            .flat_map(|r| r.images)
            .collect::<Vec<_>>();

        info!(succeeded, failed, images = images.len(), "Parallel batch finished");

        Ok(CombinedBatch {
            images,
            inference_time: total_time / succeeded as f64,
            succeeded,
            failed,
        })
    }
}
