//! Bounded exponential retry for rate-limited backend calls.

use crate::config::RetryConfig;
use crate::providers::ProviderError;
use backon::{ExponentialBuilder, Retryable};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Exponential backoff applied to the rate-limit class only.
///
/// A `retry_after` hint from the backend is a floor on the next delay.
/// Every other [`ProviderError`] fails on the first attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub factor: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            min_delay: config.min_delay,
            max_delay: config.max_delay,
            factor: config.factor,
        }
    }

    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_factor(self.factor)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
    }

    /// Run `operation`, retrying while it reports a retryable error.
    pub async fn run<T, F, Fut>(&self, label: &str, operation: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        operation
            .retry(self.backoff())
            .when(ProviderError::is_retryable)
            .adjust(|err: &ProviderError, delay: Option<Duration>| match err {
                ProviderError::RateLimited {
                    retry_after: Some(after),
                } => delay.map(|d| d.max(*after)),
                _ => delay,
            })
            .notify(|err: &ProviderError, delay: Duration| {
                warn!(operation = label, error = %err, delay = ?delay, "rate limited, backing off");
            })
            .await
    }
}
