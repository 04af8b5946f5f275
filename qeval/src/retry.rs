use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::warn;

use crate::common::RetryConfig;
use crate::error::CallError;

/// Bounded exponential backoff for transiently failing calls.
///
/// Caps both the number of attempts and the total time spent waiting.
/// Errors not marked transient are returned immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Delay before the retry that follows failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30) as i32;
        let delay = self.config.initial_delay_ms as f64 * self.config.backoff_multiplier.powi(exponent);
        let capped = delay.min(self.config.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let budget = Duration::from_millis(self.config.max_elapsed_ms);
        let mut waited = Duration::ZERO;
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.transient || attempt >= self.max_attempts() => return Err(e),
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    if waited + delay > budget {
                        warn!(
                            "{} retry budget of {:?} exhausted after {} attempts",
                            e.operation, budget, attempt
                        );
                        return Err(e);
                    }

                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                        e.operation,
                        attempt,
                        self.max_attempts(),
                        e,
                        delay
                    );
                    sleep(delay).await;
                    waited += delay;
                    attempt += 1;
                }
            }
        }
    }
}
