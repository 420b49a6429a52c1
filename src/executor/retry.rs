//! Retry settings and capped exponential backoff

use std::time::Duration;

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first attempt (total attempts = `max_retries + 1`)
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_millis(30_000),
        }
    }
}

impl RetryConfig {
    /// Create a config for no retries
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    #[must_use]
    pub const fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry_index` (0-indexed): `base * 2^index`,
    /// capped at `max_backoff`
    #[must_use]
    pub fn delay_for_retry(&self, retry_index: u32) -> Duration {
        let factor = 2u32.checked_pow(retry_index).unwrap_or(u32::MAX);
        self.base_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.total_attempts(), 4);
        assert_eq!(config.base_backoff, Duration::from_secs(1));
        assert_eq!(config.max_backoff, Duration::from_secs(30));
    }

    #[test]
    fn test_no_retry() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.total_attempts(), 1);
    }

    #[test]
    fn test_exponential_delays() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_retry(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_retry(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_retry(2), Duration::from_secs(4));
        assert_eq!(config.delay_for_retry(3), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_is_capped() {
        let config = RetryConfig {
            max_retries: 10,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
        };
        assert_eq!(config.delay_for_retry(3), Duration::from_secs(5));
        assert_eq!(config.delay_for_retry(31), Duration::from_secs(5));
        assert_eq!(config.delay_for_retry(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_delays_never_decrease() {
        let config = RetryConfig {
            max_retries: 40,
            base_backoff: Duration::from_millis(7),
            max_backoff: Duration::from_secs(60),
        };
        let delays: Vec<Duration> = (0..40).map(|i| config.delay_for_retry(i)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }
}
