//! Exponential backoff schedule for the fetcher's retry loop.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Spread delays by up to ±10% to keep clients from thundering in
    /// lockstep after a shared outage
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(16),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            jitter: true,
        }
    }

    /// Total call budget: the first attempt plus `max_retries` retries.
    pub fn total_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Deterministic delay before the given attempt (attempt 0 is the
    /// first call and waits nothing; attempt k waits base × 2^(k-1),
    /// capped).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 1).min(32);
        let delay_ms = self
            .base_delay
            .as_millis()
            .saturating_mul(1u128 << exponent);
        Duration::from_millis(delay_ms.min(self.max_delay.as_millis()) as u64)
    }

    /// `delay_for_attempt` with jitter applied when enabled.
    pub fn jittered_delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let factor = rand::thread_rng().gen_range(0.9..1.1);
        Duration::from_millis((delay.as_millis() as f64 * factor) as u64)
    }
}
