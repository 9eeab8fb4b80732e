/*!
 * Pacing and retry for language-model calls.
 *
 * `RateLimiter` enforces a fixed delay between consecutive calls; it is not
 * adaptive. `RetryPolicy` bounds the number of attempts and computes the
 * exponential backoff schedule. `RequestGate` combines the two and is shared
 * by the translator and the classifier so that both kinds of call are paced
 * against each other.
 */

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use log::{error, warn};
use parking_lot::Mutex;
use rand::Rng;
use tokio::time::{Instant, sleep};

use crate::app_config::RequestConfig;

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per call, including the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubled after each further one
    pub base_backoff: Duration,
    /// Add up to 25% random jitter
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff,
            jitter: false,
        }
    }

    pub fn from_config(config: &RequestConfig) -> Self {
        Self {
            max_attempts: config.retry_count.max(1),
            base_backoff: Duration::from_millis(config.retry_backoff_ms),
            jitter: config.jitter,
        }
    }

    /// Backoff to wait after attempt `failed_attempt` (1-based) failed
    pub fn backoff_for(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(16);
        self.base_backoff.saturating_mul(1u32 << exponent)
    }

    fn delay_for(&self, failed_attempt: u32) -> Duration {
        let backoff = self.backoff_for(failed_attempt);
        if !self.jitter || backoff.is_zero() {
            return backoff;
        }
        let extra = rand::rng().random_range(0.0..0.25);
        backoff + backoff.mul_f64(extra)
    }

    /// Whether another attempt is allowed after `attempt` failed
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RequestConfig::default())
    }
}

/// Fixed minimum spacing between consecutive calls
#[derive(Debug)]
pub struct RateLimiter {
    delay: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_call: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Time still to wait before the next call may start
    pub fn remaining(&self) -> Duration {
        match *self.last_call.lock() {
            Some(last) => self.delay.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Sleep until the next call may start
    pub async fn wait(&self) {
        let remaining = self.remaining();
        if !remaining.is_zero() {
            sleep(remaining).await;
        }
    }

    /// Record that a call just finished
    pub fn mark(&self) {
        *self.last_call.lock() = Some(Instant::now());
    }
}

/// How a single attempt failed
#[derive(Debug)]
pub enum AttemptError<E> {
    /// Worth trying again
    Retryable(E),
    /// Stop immediately
    Fatal(E),
}

/// Successful call and the number of attempts it took
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

/// Call that did not succeed
#[derive(Debug)]
pub struct RetryFailure<E> {
    pub error: E,
    pub attempts: u32,
    /// The error was fatal rather than the attempts running out
    pub fatal: bool,
}

/// Rate limiter plus retry policy around model calls
#[derive(Debug)]
pub struct RequestGate {
    policy: RetryPolicy,
    limiter: RateLimiter,
}

impl RequestGate {
    pub fn new(policy: RetryPolicy, rate_limit_delay: Duration) -> Self {
        Self {
            policy,
            limiter: RateLimiter::new(rate_limit_delay),
        }
    }

    pub fn from_config(config: &RequestConfig) -> Self {
        Self::new(
            RetryPolicy::from_config(config),
            Duration::from_millis(config.rate_limit_delay_ms),
        )
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds, fails fatally or runs out of attempts.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn call<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<Attempted<T>, RetryFailure<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AttemptError<E>>>,
        E: Display,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.limiter.wait().await;
            let result = op(attempt).await;
            self.limiter.mark();

            match result {
                Ok(value) => {
                    return Ok(Attempted {
                        value,
                        attempts: attempt,
                    });
                }
                Err(AttemptError::Fatal(error)) => {
                    error!("{}: attempt {} failed fatally: {}", label, attempt, error);
                    return Err(RetryFailure {
                        error,
                        attempts: attempt,
                        fatal: true,
                    });
                }
                Err(AttemptError::Retryable(error)) => {
                    if !self.policy.should_retry(attempt) {
                        error!("{}: all {} attempts failed, last error: {}", label, attempt, error);
                        return Err(RetryFailure {
                            error,
                            attempts: attempt,
                            fatal: false,
                        });
                    }
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        "{}: attempt {}/{} failed: {} (retrying in {:?})",
                        label, attempt, self.policy.max_attempts, error, delay
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
