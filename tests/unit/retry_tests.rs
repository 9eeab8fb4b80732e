/*!
 * Tests for request pacing and retry with backoff
 *
 * These run on a paused tokio clock so that backoff delays are observable
 * without actually waiting.
 */

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use reviewlens::app_config::RequestConfig;
use reviewlens::errors::ProviderError;
use reviewlens::retry::{AttemptError, RateLimiter, RequestGate, RetryPolicy};
use tokio::time::Instant;

fn gate(attempts: u32, backoff_ms: u64, delay_ms: u64) -> RequestGate {
    RequestGate::new(
        RetryPolicy::new(attempts, Duration::from_millis(backoff_ms)),
        Duration::from_millis(delay_ms),
    )
}

/// Three failed attempts wait 2s and then 4s
#[tokio::test(start_paused = true)]
async fn test_call_withPersistentFailure_shouldBackOffExponentially() {
    let gate = gate(3, 2000, 0);
    let started = Instant::now();

    let result = gate
        .call("test", |_attempt| async {
            Err::<(), _>(AttemptError::Retryable(ProviderError::ConnectionError("reset".into())))
        })
        .await;

    let failure = result.unwrap_err();
    assert_eq!(failure.attempts, 3);
    assert!(!failure.fatal);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(6), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(6100), "elapsed {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_call_withFatalError_shouldStopImmediately() {
    let gate = gate(3, 2000, 0);
    let calls = AtomicU32::new(0);
    let started = Instant::now();

    let result = gate
        .call("test", |_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(AttemptError::Fatal(ProviderError::AuthenticationError("bad key".into()))) }
        })
        .await;

    let failure = result.unwrap_err();
    assert!(failure.fatal);
    assert_eq!(failure.attempts, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_call_withRecoveryOnSecondAttempt_shouldReportAttempts() {
    let gate = gate(3, 100, 0);

    let result = gate
        .call("test", |attempt| async move {
            if attempt < 2 {
                Err(AttemptError::Retryable(ProviderError::EmptyResponse))
            } else {
                Ok(attempt * 10)
            }
        })
        .await
        .unwrap();

    assert_eq!(result.value, 20);
    assert_eq!(result.attempts, 2);
}

/// Consecutive calls are spaced by the configured delay
#[tokio::test(start_paused = true)]
async fn test_call_withRateLimit_shouldSpaceConsecutiveCalls() {
    let gate = gate(1, 0, 500);
    let started = Instant::now();

    for _ in 0..3 {
        let result = gate
            .call("test", |_attempt| async { Ok::<_, AttemptError<ProviderError>>(()) })
            .await;
        assert!(result.is_ok());
    }

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(1000), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1100), "elapsed {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limiter_beforeFirstCall_shouldNotWait() {
    let limiter = RateLimiter::new(Duration::from_millis(500));
    assert_eq!(limiter.remaining(), Duration::ZERO);

    limiter.mark();
    assert_eq!(limiter.remaining(), Duration::from_millis(500));

    tokio::time::advance(Duration::from_millis(200)).await;
    assert_eq!(limiter.remaining(), Duration::from_millis(300));
}

#[test]
fn test_retry_policy_fromConfig_shouldUseDefaults() {
    let policy = RetryPolicy::from_config(&RequestConfig::default());
    assert_eq!(policy.max_attempts, 3);
    assert_eq!(policy.base_backoff, Duration::from_millis(2000));
    assert!(!policy.jitter);
    assert!(policy.should_retry(2));
    assert!(!policy.should_retry(3));
}
