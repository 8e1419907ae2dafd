//! Retry helpers shared by the network and language-model clients

use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

/// Upper bound for a single backoff delay
const MAX_DELAY_MS: u64 = 30_000;

/// Retry policy for idempotent requests
#[derive(Debug, Clone)]
pub struct RetryOptions {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_seconds: u64,
    pub user_agent: String,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 500,
            timeout_seconds: 30,
            user_agent: crate::version::user_agent(),
        }
    }
}

/// Delay before the given attempt: `base * 2^attempt * (1 + jitter)`, capped
pub fn backoff_delay(attempt: u32, base_delay_ms: u64) -> Duration {
    let jitter: f64 = rand::thread_rng().gen_range(0.0..=1.0);
    let delay_ms = (base_delay_ms as f64 * 2.0_f64.powi(attempt as i32) * (1.0 + jitter)) as u64;
    Duration::from_millis(delay_ms.min(MAX_DELAY_MS))
}

/// Exponential backoff with jitter
pub async fn exponential_backoff_with_jitter(attempt: u32, base_delay_ms: u64) {
    sleep(backoff_delay(attempt, base_delay_ms)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_is_capped() {
        let first = backoff_delay(0, 100);
        assert!(first >= Duration::from_millis(100));
        assert!(first <= Duration::from_millis(200));

        let third = backoff_delay(2, 100);
        assert!(third >= Duration::from_millis(400));
        assert!(third <= Duration::from_millis(800));

        assert_eq!(backoff_delay(20, 1000), Duration::from_millis(MAX_DELAY_MS));
    }
}
