use std::time::Duration;

use derive_setters::Setters;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Setters, PartialEq)]
#[setters(into)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: usize,

    /// Delay in milliseconds before the first retry; doubles on every
    /// subsequent retry
    pub initial_delay_ms: u64,

    /// Upper bound in milliseconds for a single backoff sleep
    pub max_delay_ms: u64,

    /// Sleep a random 0-1s before the very first attempt. Spreads out a burst
    /// of concurrent requests that share one rate limit.
    pub initial_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 60_000,
            initial_jitter: false,
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms.max(self.initial_delay_ms))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.initial_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, 60_000);
        assert_eq!(config.initial_jitter, false);
    }

    #[test]
    fn test_retry_config_setters() {
        let config = RetryConfig::default()
            .max_retries(3usize)
            .initial_delay_ms(100u64)
            .max_delay_ms(400u64)
            .initial_jitter(true);

        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_delay(), Duration::from_millis(100));
        assert_eq!(config.max_delay(), Duration::from_millis(400));
        assert_eq!(config.initial_jitter, true);
    }

    #[test]
    fn test_max_delay_never_below_initial_delay() {
        let fixture = RetryConfig::default()
            .initial_delay_ms(500u64)
            .max_delay_ms(100u64);

        let actual = fixture.max_delay();
        let expected = Duration::from_millis(500);

        assert_eq!(actual, expected);
    }
}
