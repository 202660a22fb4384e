//! Reconnect backoff policy
//!
//! Attempt `n` (1-indexed) waits `min(base_delay * 2^(n-1), max_delay)`.
//! Once `max_attempts` reconnects have failed the connection gives up.

use std::time::Duration;

use tokio_retry::strategy::ExponentialBackoff;

/// Delay before the first reconnect attempt (1 second)
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound on any single reconnect delay (30 seconds)
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Reconnect attempts before the connection is declared stale
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl BackoffPolicy {
    /// Delay before reconnect attempt `attempt`, or `None` once attempts are exhausted
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }

        match self.strategy() {
            Some(mut strategy) => strategy.nth(attempt as usize - 1),
            None => Some(self.doubled(attempt)),
        }
    }

    /// Every delay this policy will ever schedule, in order
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..=self.max_attempts).filter_map(move |attempt| self.delay_for(attempt))
    }

    /// `ExponentialBackoff` yields `factor * base^n` ms, so an even base delay
    /// of `2k` ms is expressed as base 2 with factor `k`
    fn strategy(&self) -> Option<ExponentialBackoff> {
        let base_ms = u64::try_from(self.base_delay.as_millis()).ok()?;
        if base_ms < 2 || base_ms % 2 != 0 || Duration::from_millis(base_ms) != self.base_delay {
            return None;
        }

        Some(
            ExponentialBackoff::from_millis(2)
                .factor(base_ms / 2)
                .max_delay(self.max_delay),
        )
    }

    /// Odd or sub-millisecond base delays have no integer factor
    fn doubled(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(multiplier).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let policy = BackoffPolicy::default();
        let delays: Vec<u64> = policy.delays().map(|d| d.as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = BackoffPolicy {
            max_attempts: 8,
            ..BackoffPolicy::default()
        };
        assert_eq!(policy.delay_for(5), Some(Duration::from_secs(16)));
        assert_eq!(policy.delay_for(6), Some(Duration::from_secs(30)));
        assert_eq!(policy.delay_for(8), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_exhausted_attempts() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(0), None);
        assert_eq!(policy.delay_for(6), None);
    }

    #[test]
    fn test_large_attempt_does_not_overflow() {
        let policy = BackoffPolicy {
            max_attempts: u32::MAX,
            ..BackoffPolicy::default()
        };
        assert_eq!(policy.delay_for(64), Some(DEFAULT_MAX_DELAY));
    }

    #[test]
    fn test_even_millisecond_base() {
        let policy = BackoffPolicy {
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_millis(1500),
            max_attempts: 5,
        };
        let delays: Vec<u128> = policy.delays().map(|d| d.as_millis()).collect();
        assert_eq!(delays, vec![250, 500, 1000, 1500, 1500]);
    }

    #[test]
    fn test_odd_millisecond_base() {
        let policy = BackoffPolicy {
            base_delay: Duration::from_millis(1001),
            max_delay: Duration::from_secs(30),
            max_attempts: 3,
        };
        let delays: Vec<u128> = policy.delays().map(|d| d.as_millis()).collect();
        assert_eq!(delays, vec![1001, 2002, 4004]);
    }

    #[test]
    fn test_one_millisecond_base() {
        let policy = BackoffPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_secs(1),
            max_attempts: 4,
        };
        let delays: Vec<u128> = policy.delays().map(|d| d.as_millis()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8]);
    }
}
