use std::time::Duration;

/// Exponential backoff for channel reconnects.
///
/// `max_attempts` counts connection attempts, the first one included, so the
/// default of 3 allows two scheduled reconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the reconnect that follows `attempts` failed reconnects.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempts);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// True once the attempt that just closed was the last one allowed.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts.saturating_add(1) >= self.max_attempts
    }
}
