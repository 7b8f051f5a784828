//! Bounded exponential backoff for transient provider errors.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use drivetool_common::Result;

/// How often and how patiently a failing call is repeated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts after the first one.
    pub max_retries: u32,
    #[serde(with = "millis")]
    pub initial_delay: Duration,
    /// Upper bound for any single wait.
    #[serde(with = "millis")]
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Spread each wait over +/- 25%.
    pub jitter: bool,
}

impl RetryConfig {
    /// `max_retries` retries starting at 500ms, doubling up to 8s.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Wait before retry number `retry` (zero-based).
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let grown = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(retry as i32);
        let capped = grown.min(self.max_delay.as_millis() as f64);

        let millis = if self.jitter {
            capped * (0.75 + rand::random::<f64>() * 0.5)
        } else {
            capped
        };

        Duration::from_millis(millis as u64)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Runs provider calls, repeating those that fail transiently.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Run `operation`, retrying only errors marked transient.
    ///
    /// Gives up after `max_retries` retries and returns the last error.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries = 0;

        loop {
            let err = match operation().await {
                Ok(value) => {
                    if retries > 0 {
                        debug!("Call succeeded after {} retries", retries);
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() && retries < self.config.max_retries => err,
                Err(err) => {
                    if retries > 0 {
                        warn!("Giving up after {} attempts: {}", retries + 1, err);
                    }
                    return Err(err);
                }
            };

            let delay = self.config.delay_for_attempt(retries);
            retries += 1;
            warn!("Transient failure ({}), retry {} in {:?}", err, retries, delay);
            sleep(delay).await;
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
