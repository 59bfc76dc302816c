//! Retry policy with exponential backoff
//!
//! A standalone policy object (attempt bound, backoff curve, retryable
//! predicate supplied by the caller) shared by promotion, cutover, state
//! commits and notification delivery.
//!
//! ```ignore
//! let policy = RetryPolicy::exponential()
//!     .max_attempts(5)
//!     .initial_backoff(Duration::from_millis(500));
//!
//! let result = policy
//!     .run(|attempt| call_api(attempt), |e: &ApiError| e.is_retryable())
//!     .await;
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound on any single delay
    pub max_backoff: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
    /// Randomize each delay into `[delay / 2, delay]`
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Why a retried operation gave up.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryFailure<E> {
    /// Error returned by the final attempt
    pub last_error: E,
    /// Attempts made
    pub attempts: u32,
    /// True when the attempt bound was hit; false when the error was not retryable
    pub exhausted: bool,
}

/// Successful result and the attempt it took.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    pub value: T,
    pub attempts: u32,
}

impl RetryPolicy {
    /// Exponential backoff with the default bounds.
    pub fn exponential() -> Self {
        Self::default()
    }

    /// Constant delay between attempts.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_backoff: delay,
            max_backoff: delay,
            multiplier: 1.0,
            jitter: false,
            ..Default::default()
        }
    }

    /// A single attempt, never retried.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }

    pub fn max_backoff(mut self, delay: Duration) -> Self {
        self.max_backoff = delay;
        self
    }

    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Effective attempt bound.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Un-jittered delay before retry number `retry` (1-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(63) as i32;
        let factor = self.multiplier.max(1.0).powi(exp);
        let millis = self.initial_backoff.as_millis() as f64 * factor;
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    fn delay_for(&self, retry: u32) -> Duration {
        let delay = self.backoff_for(retry);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let millis = delay.as_millis() as u64;
        let jittered = rand::thread_rng().gen_range(millis / 2..=millis);
        Duration::from_millis(jittered)
    }

    /// Run `op` until it succeeds, returns a non-retryable error, or the
    /// attempt bound is reached. `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut, P>(
        &self,
        mut op: F,
        is_retryable: P,
    ) -> Result<RetryOutcome<T>, RetryFailure<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let max = self.attempts();
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    return Ok(RetryOutcome {
                        value,
                        attempts: attempt,
                    })
                }
                Err(e) if !is_retryable(&e) => {
                    return Err(RetryFailure {
                        last_error: e,
                        attempts: attempt,
                        exhausted: false,
                    })
                }
                Err(e) if attempt >= max => {
                    return Err(RetryFailure {
                        last_error: e,
                        attempts: attempt,
                        exhausted: true,
                    })
                }
                Err(_) => {
                    tokio::time::sleep(self.delay_for(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}
