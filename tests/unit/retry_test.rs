//! Unit tests for the retrying caller

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use imagegen_gateway::backend::traits::UpstreamError;
use imagegen_gateway::gateway::key_record::KeyStatus;
use imagegen_gateway::gateway::retry::{RetryPolicy, RetryingCaller};
use imagegen_gateway::AppError;

use crate::common::{balancer, status, success, upstream_request, ScriptedBackend};

fn caller(keys: &[&str], backend: Arc<ScriptedBackend>) -> RetryingCaller {
    RetryingCaller::new(balancer(keys), backend, RetryPolicy::default())
}

#[tokio::test(start_paused = true)]
async fn test_backoff_then_success() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        status(429, "rate limited"),
        status(429, "rate limited"),
        Ok(success("third")),
    ]));
    let caller = caller(&["k1", "k2", "k3"], backend.clone());

    let start = Instant::now();
    let result = caller.call(&upstream_request()).await.unwrap();
    let elapsed = start.elapsed();

    // 1s after the first attempt, 2s after the second
    assert!(elapsed >= Duration::from_secs(3), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(3100), "elapsed {:?}", elapsed);
    assert_eq!(result.images.len(), 1);
    assert_eq!(backend.keys_used(), vec!["k1", "k2", "k3"]);

    let records = caller.balancer().snapshot();
    let failures: u32 = records.iter().map(|r| r.consecutive_failures()).sum();
    let successes: u32 = records.iter().map(|r| r.requests_per_day()).sum();
    assert_eq!(failures, 2);
    assert_eq!(successes, 1);
}

#[tokio::test(start_paused = true)]
async fn test_retries_exhausted_without_trailing_sleep() {
    let backend = Arc::new(ScriptedBackend::always(status(429, "slow down")));
    let caller = caller(&["k1", "k2", "k3"], backend.clone());

    let start = Instant::now();
    let err = caller.call(&upstream_request()).await.unwrap_err();

    assert!(matches!(err, AppError::RetriesExhausted));
    assert_eq!(backend.call_count(), 3);
    assert!(start.elapsed() < Duration::from_millis(3100));
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_retries_immediately() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        status(401, "invalid key"),
        Ok(success("second")),
    ]));
    let caller = caller(&["bad", "good"], backend.clone());

    let start = Instant::now();
    caller.call(&upstream_request()).await.unwrap();

    assert!(start.elapsed() < Duration::from_millis(1));
    assert_eq!(backend.keys_used(), vec!["bad", "good"]);
}

#[tokio::test]
async fn test_permanent_error_surfaces_upstream_status() {
    let backend = Arc::new(ScriptedBackend::new(vec![status(400, "prompt rejected")]));
    let caller = caller(&["k1"], backend.clone());

    let err = caller.call(&upstream_request()).await.unwrap_err();
    match err {
        AppError::Upstream { status, body } => {
            assert_eq!(status, 400);
            assert_eq!(body, "prompt rejected");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(backend.call_count(), 1);
    assert_eq!(caller.balancer().snapshot()[0].consecutive_failures(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_are_retried() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        Err(UpstreamError::Timeout("120s elapsed".to_string())),
        Ok(success("after-timeout")),
    ]));
    let caller = caller(&["k1", "k2"], backend.clone());

    let start = Instant::now();
    caller.call(&upstream_request()).await.unwrap();

    assert!(start.elapsed() >= Duration::from_secs(1));
    assert_eq!(backend.call_count(), 2);
}

#[tokio::test]
async fn test_no_keys_fails_before_calling_upstream() {
    let backend = Arc::new(ScriptedBackend::new(vec![]));
    let caller = caller(&["k1"], backend.clone());
    for _ in 0..3 {
        caller.balancer().record_failure("k1");
    }

    let err = caller.call(&upstream_request()).await.unwrap_err();
    assert!(matches!(err, AppError::NoKeysAvailable));
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_failures_take_single_key_offline() {
    let backend = Arc::new(ScriptedBackend::always(status(429, "busy")));
    let caller = caller(&["solo"], backend.clone());

    let err = caller.call(&upstream_request()).await.unwrap_err();
    assert!(matches!(err, AppError::RetriesExhausted));
    assert_eq!(caller.balancer().key_status("solo"), Some(KeyStatus::Failed));

    let err = caller.call(&upstream_request()).await.unwrap_err();
    assert!(matches!(err, AppError::NoKeysAvailable));
}

#[tokio::test]
async fn test_call_with_key_reports_outcome() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        Ok(success("one")),
        status(500, "boom"),
    ]));
    let caller = caller(&["k1"], backend.clone());

    caller
        .call_with_key("k1", &upstream_request())
        .await
        .unwrap();
    let err = caller
        .call_with_key("k1", &upstream_request())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Upstream { status: 500, .. }));
    let record = &caller.balancer().snapshot()[0];
    assert_eq!(record.requests_per_day(), 1);
    assert_eq!(record.consecutive_failures(), 1);
}
