use crate::error::TrackerError;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    None,
    /// `unit * n` after the n-th failed attempt.
    Linear(Duration),
    /// `base * 2^(n-1)` after the n-th failed attempt.
    Exponential(Duration),
}

impl Backoff {
    pub fn delay(&self, failed_attempt: u32) -> Duration {
        match *self {
            Self::None => Duration::ZERO,
            Self::Linear(unit) => unit.saturating_mul(failed_attempt),
            Self::Exponential(base) => {
                base.saturating_mul(1u32 << failed_attempt.saturating_sub(1).min(16))
            }
        }
    }
}

/// Bounded retry with a fixed (jitter-free) backoff schedule.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub is_retryable: fn(&TrackerError) -> bool,
}

impl RetryPolicy {
    pub fn linear(max_attempts: u32, unit: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Linear(unit),
            is_retryable: TrackerError::is_transient,
        }
    }

    pub fn exponential(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential(base),
            is_retryable: TrackerError::is_transient,
        }
    }

    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::None,
            is_retryable: TrackerError::is_transient,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_retryable(mut self, is_retryable: fn(&TrackerError) -> bool) -> Self {
        self.is_retryable = is_retryable;
        self
    }

    /// Runs `op` until it succeeds, the error is not retryable, or the
    /// attempt budget is spent. `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, TrackerError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, TrackerError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(v) => return Ok(v),
                Err(err) => {
                    if attempt >= max_attempts || !(self.is_retryable)(&err) {
                        return Err(err);
                    }
                    let backoff = self.backoff.delay(attempt);
                    tracing::warn!(label, attempt, ?backoff, error = %err, "fetch attempt failed; retrying");
                    if !backoff.is_zero() {
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }
    }
}
