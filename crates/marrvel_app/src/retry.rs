use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use backon::{BackoffBuilder, Retryable};
use marrvel_config::RetryConfig;
use rand::Rng;
use tracing::{debug, warn};

/// Exponential backoff whose jitter is proportional to the current delay: each
/// sleep is `min(delay + delay * U(0.1, 0.3), max)`, after which the delay
/// doubles up to `max`.
#[derive(Debug, Clone, Copy)]
pub struct ThrottleBackoffBuilder {
    initial_delay: Duration,
    max_delay: Duration,
    max_retries: usize,
}

impl ThrottleBackoffBuilder {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            initial_delay: config.initial_delay(),
            max_delay: config.max_delay(),
            max_retries: config.max_retries,
        }
    }
}

impl BackoffBuilder for ThrottleBackoffBuilder {
    type Backoff = ThrottleBackoff;

    fn build(self) -> Self::Backoff {
        ThrottleBackoff {
            delay: self.initial_delay.min(self.max_delay),
            max_delay: self.max_delay,
            remaining: self.max_retries,
        }
    }
}

#[derive(Debug)]
pub struct ThrottleBackoff {
    delay: Duration,
    max_delay: Duration,
    remaining: usize,
}

impl Iterator for ThrottleBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let jitter = self.delay.mul_f64(rand::rng().random_range(0.1..0.3));
        let sleep = (self.delay + jitter).min(self.max_delay);
        self.delay = (self.delay * 2).min(self.max_delay);
        Some(sleep)
    }
}

/// Whether an error signals throttling by the backend. Looks at the type name
/// and message of every error in the chain, case-insensitively.
pub fn is_throttling(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        let text = format!("{cause:?} {cause}").to_lowercase();
        text.contains("throttling")
            || (text.contains("rate") && text.contains("limit"))
            || text.contains("too many")
            || text.contains("reached max retries")
    })
}

/// Runs `operation`, retrying throttling errors with [`ThrottleBackoff`].
/// Any other error is returned after the first attempt.
pub async fn retry_with_config<F, Fut, T, C>(
    config: &RetryConfig,
    operation: F,
    notify: Option<C>,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<T>>,
    C: Fn(&anyhow::Error, Duration) + Send + Sync + 'static,
{
    if config.initial_jitter {
        let jitter = Duration::from_millis(rand::rng().random_range(0..1000));
        debug!(jitter_ms = jitter.as_millis() as u64, "Initial jitter");
        tokio::time::sleep(jitter).await;
    }

    let started = Instant::now();
    let attempt = AtomicUsize::new(1);

    let result = operation
        .retry(ThrottleBackoffBuilder::new(config))
        .when(is_throttling)
        .notify(|error: &anyhow::Error, delay: Duration| {
            let attempt = attempt.fetch_add(1, Ordering::Relaxed);
            warn!(
                attempt,
                max_retries = config.max_retries,
                elapsed_ms = started.elapsed().as_millis() as u64,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Throttled, retrying"
            );
            if let Some(callback) = notify.as_ref() {
                callback(error, delay);
            }
        })
        .await;

    if let Err(error) = &result {
        let attempts = attempt.load(Ordering::Relaxed);
        if is_throttling(error) {
            warn!(attempts, error = %error, "Retries exhausted");
        } else {
            debug!(attempts, error = %error, "Non-retryable error");
        }
    }

    result
}
