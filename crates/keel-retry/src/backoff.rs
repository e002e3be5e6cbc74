use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry policy configuration.
///
/// The delay before attempt `n` (1-based) is
/// `min(initial_delay * backoff_multiplier^(n-1), max_delay)`, optionally
/// jittered by ±25% to avoid synchronized retries across concurrent
/// callers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryOptions {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Base delay before the first retry.
    pub initial_delay: Duration,
    /// Multiplier applied per additional attempt.
    pub backoff_multiplier: f64,
    /// Upper bound on any single computed delay.
    pub max_delay: Duration,
    /// Apply ±25% uniform jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(30_000),
            jitter: true,
        }
    }
}

impl RetryOptions {
    /// Options with no delay between attempts (for tests).
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }
}

/// The backoff delay before the given 1-based attempt, without jitter.
pub fn delay_for_attempt(options: &RetryOptions, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let millis = options.initial_delay.as_millis() as f64
        * options.backoff_multiplier.powi(exponent as i32);
    let capped = millis.min(options.max_delay.as_millis() as f64);
    Duration::from_millis(capped as u64)
}

/// Apply ±25% uniform jitter to a delay.
pub fn jittered(delay: Duration) -> Duration {
    if delay.is_zero() {
        return delay;
    }
    let factor = 0.75 + rand::random::<f64>() * 0.5;
    Duration::from_millis((delay.as_millis() as f64 * factor) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> RetryOptions {
        RetryOptions {
            max_attempts: 10,
            initial_delay: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(30_000),
            jitter: false,
        }
    }

    #[test]
    fn first_retry_uses_initial_delay() {
        assert_eq!(delay_for_attempt(&opts(), 1), Duration::from_millis(1000));
    }

    #[test]
    fn delays_double_per_attempt() {
        assert_eq!(delay_for_attempt(&opts(), 2), Duration::from_millis(2000));
        assert_eq!(delay_for_attempt(&opts(), 3), Duration::from_millis(4000));
        assert_eq!(delay_for_attempt(&opts(), 5), Duration::from_millis(16_000));
    }

    #[test]
    fn delay_is_capped_at_max() {
        // min(1000 * 2^5, 30000) = 30000.
        assert_eq!(delay_for_attempt(&opts(), 6), Duration::from_millis(30_000));
        assert_eq!(delay_for_attempt(&opts(), 20), Duration::from_millis(30_000));
    }

    #[test]
    fn jitter_stays_within_quarter_band() {
        let base = Duration::from_millis(1000);
        for _ in 0..100 {
            let j = jittered(base);
            assert!(j >= Duration::from_millis(750), "jitter below band: {j:?}");
            assert!(j <= Duration::from_millis(1250), "jitter above band: {j:?}");
        }
    }

    #[test]
    fn zero_delay_is_not_jittered() {
        assert_eq!(jittered(Duration::ZERO), Duration::ZERO);
    }
}
