//! Bounded exponential backoff for transient provider failures.

use std::time::Duration;

use codeloop_core::error::ProviderError;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl From<&codeloop_config::RetryConfig> for RetryPolicy {
    fn from(config: &codeloop_config::RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Whether attempt number `attempt` (1-based) that failed with `error`
    /// should be followed by another.
    pub fn should_retry(&self, attempt: u32, error: &ProviderError) -> bool {
        error.is_transient() && attempt < self.max_attempts
    }

    /// Delay before the attempt after `attempt`. A vendor `retry-after` hint
    /// wins over the exponential schedule but is still capped.
    pub fn delay_for(&self, attempt: u32, error: &ProviderError) -> Duration {
        if let ProviderError::RateLimited {
            retry_after_secs: Some(secs),
        } = error
        {
            return Duration::from_secs(*secs).min(self.max_delay);
        }
        let exponent = attempt.saturating_sub(1);
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Sleep for `delay` unless cancelled first. Returns false on cancellation.
pub async fn backoff(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
