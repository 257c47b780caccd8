use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use super::{FailureClass, TransportError};

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one; never less than 1.
    pub max_attempts: u32,
    /// Delay after the first failure; doubled for each further attempt.
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Failure classes that end the loop immediately.
    pub non_retryable: Vec<FailureClass>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            non_retryable: vec![FailureClass::RateLimited, FailureClass::Unexpected],
        }
    }
}

/// The error that ended a retry loop, with the number of attempts made.
#[derive(Debug)]
pub struct RetryFailure {
    pub attempts: u32,
    pub error: TransportError,
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Delay to wait after the given zero-based failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn is_retryable(&self, class: FailureClass) -> bool {
        !self.non_retryable.contains(&class)
    }

    /// Run `op` until it succeeds, fails with a non-retryable class, or attempts run out.
    ///
    /// `op` receives the zero-based attempt number.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, RetryFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let attempts = attempt + 1;
                    if !self.is_retryable(error.class()) || attempts >= max_attempts {
                        return Err(RetryFailure { attempts, error });
                    }
                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt = attempts,
                        max_attempts,
                        delay = %humantime::format_duration(delay),
                        error = %error,
                        "model call failed; retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
