use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wait between retryable failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackoffPolicy {
    /// Always wait `base_ms`.
    Fixed { base_ms: u64 },
    /// Wait `base_ms * 2^retry`.
    Exponential { base_ms: u64 },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Exponential { base_ms: 1000 }
    }
}

impl BackoffPolicy {
    pub fn fixed(base: Duration) -> Self {
        BackoffPolicy::Fixed {
            base_ms: base.as_millis() as u64,
        }
    }

    pub fn exponential(base: Duration) -> Self {
        BackoffPolicy::Exponential {
            base_ms: base.as_millis() as u64,
        }
    }

    pub fn base(&self) -> Duration {
        match *self {
            BackoffPolicy::Fixed { base_ms } | BackoffPolicy::Exponential { base_ms } => {
                Duration::from_millis(base_ms)
            }
        }
    }

    /// Delay before the next attempt. `retry` is 0 for the wait after the
    /// first failed attempt.
    pub fn delay(&self, retry: u32) -> Duration {
        match self {
            BackoffPolicy::Fixed { .. } => self.base(),
            BackoffPolicy::Exponential { .. } => {
                let multiplier = 2_u32.saturating_pow(retry);
                self.base().saturating_mul(multiplier)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay_is_constant() {
        let policy = BackoffPolicy::fixed(Duration::from_millis(300));
        for retry in 0..5 {
            assert_eq!(policy.delay(retry), Duration::from_millis(300));
        }
    }

    #[test]
    fn test_exponential_delay_doubles() {
        let policy = BackoffPolicy::exponential(Duration::from_millis(100));
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
        assert_eq!(policy.delay(3), Duration::from_millis(800));
    }

    #[test]
    fn test_exponential_delay_saturates() {
        let policy = BackoffPolicy::Exponential { base_ms: u64::MAX / 2 };
        assert!(policy.delay(40) > Duration::ZERO);
    }

    #[test]
    fn test_default_matches_one_two_four_seconds() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
    }
}
