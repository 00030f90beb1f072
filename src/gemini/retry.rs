/// Configuration for retry behavior of model requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub base_delay_ms: u64,
    /// Upper bound for any single wait, backoff or server-requested.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
        }
    }
}

impl RetryConfig {
    /// Calculate the delay for a given retry attempt using exponential backoff.
    /// delay = min(base_delay_ms * 2^(attempt - 1), max_delay_ms)
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        self.capped(
            self.base_delay_ms
                .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1))),
        )
    }

    /// Clamp a delay to `max_delay_ms`.
    pub fn capped(&self, delay_ms: u64) -> u64 {
        delay_ms.min(self.max_delay_ms)
    }
}
