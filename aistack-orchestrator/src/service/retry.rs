//! Retry Controller
//!
//! Runs a stage operation up to `max_attempts` times with a non-decreasing
//! delay between attempts. A non-retryable error ends the loop at once.

use std::future::Future;
use std::time::Duration;

use aistack_core::domain::job::Stage;
use tracing::warn;

use crate::stages::StageError;

/// Delay schedule between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// `base * 2^(retry - 1)`, capped at `max`
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay before retry number `retry` (1 = the second attempt)
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(retry.saturating_sub(1));
                base.checked_mul(factor).unwrap_or(max).min(max)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

/// Result of a retried operation together with the invocations it took
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T, StageError>,
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Policy without delays, for tests
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Backoff::Fixed(Duration::ZERO))
    }

    /// Invokes `op` until it succeeds, fails non-retryably or runs out of
    /// attempts
    ///
    /// `op` receives the 1-based attempt number. On exhaustion the last
    /// error is returned unchanged.
    pub async fn execute<T, F, Fut>(&self, stage: Stage, mut op: F) -> Attempted<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, StageError>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    return Attempted {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(err) if !err.is_retryable() || attempt >= self.max_attempts => {
                    return Attempted {
                        result: Err(err),
                        attempts: attempt,
                    };
                }
                Err(err) => {
                    let delay = self.backoff.delay(attempt);
                    warn!(
                        "{} attempt {}/{} failed: {}; retrying in {}ms",
                        stage,
                        attempt,
                        self.max_attempts,
                        err,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            3,
            Backoff::Exponential {
                base: Duration::from_secs(1),
                max: Duration::from_secs(30),
            },
        )
    }
}
