// Bounded retry with exponential backoff.
//
// Appliance calls fail transiently all the time (AS3 busy, management
// plane restarting). Every device request goes through `RetryPolicy::run`,
// which retries only errors that report `is_transient()`.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::error::Error;

/// Exponential backoff configuration for device requests.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on a single backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum number of attempts, including the first. Default: 5.
    pub max_attempts: u32,

    /// Give up once this much time has passed since the first attempt.
    /// Default: 60s.
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
            max_elapsed: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Run `op` until it succeeds, fails permanently, or the budget is spent.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let started = Instant::now();
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => {
                    attempt += 1;
                    let delay = self.backoff(attempt - 1);
                    let exhausted = attempt >= self.max_attempts.max(1)
                        || started.elapsed() + delay > self.max_elapsed;
                    if exhausted {
                        debug!(what, attempt, error = %err, "retry budget exhausted");
                        return Err(err);
                    }
                    debug!(what, attempt, ?delay, error = %err, "transient failure, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Exponential backoff with jitter.
    ///
    /// `delay = min(initial * 2^attempt, max) * jitter`
    ///
    /// Jitter is +-25% to spread out retries from several agents hitting
    /// the same appliance.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
        let base = self.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        // Deterministic "jitter" seeded from the attempt number.
        let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
        let with_jitter = (capped * jitter_factor).max(0.0);

        Duration::from_secs_f64(with_jitter)
    }
}
