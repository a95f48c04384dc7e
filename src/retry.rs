//! Retry with doubling backoff for outbound API calls.
//!
//! Used by the email and calendar providers for idempotent reads, where a
//! transient network blip should not become a failed tool result. Never
//! applied to LLM streaming: the loop's invocation cap is a hard invariant.
//!
//! The wait doubles after every failure up to a ceiling, and each sleep is
//! smeared across a small random window so parallel tool calls that failed
//! together do not hammer the backend in lockstep.

use crate::Result;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Bounds for the retry loop.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Wait after the first failure; doubles from there
    pub initial_delay: Duration,

    /// Ceiling the doubling stops at
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// Set total attempts
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the wait after the first failure
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }
}

/// Smears a delay across a window of plus or minus one eighth of its
/// length, so retries from concurrent callers spread out.
fn smear(delay: Duration) -> Duration {
    let window_ms = (delay.as_millis() as u64) / 4;
    if window_ms == 0 {
        return delay;
    }
    let offset = rand::thread_rng().gen_range(0..=window_ms);
    delay - Duration::from_millis(window_ms / 2) + Duration::from_millis(offset)
}

/// Runs an operation until it succeeds or the attempt budget is spent.
///
/// The wait between attempts starts at `initial_delay` and doubles per
/// failure, capped at `max_delay`. The final error is returned as-is.
pub async fn retry_with_backoff<T, F, Fut>(config: RetryConfig, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut wait = config.initial_delay;
    let mut attempt = 1u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= config.max_attempts => return Err(e),
            Err(e) => {
                log::debug!(
                    "Attempt {} of {} failed ({}); waiting before the next one",
                    attempt,
                    config.max_attempts,
                    e
                );
                sleep(smear(wait)).await;
                wait = (wait * 2).min(config.max_delay);
                attempt += 1;
            }
        }
    }
}
