use rand::Rng;
use std::time::Duration;

/// Bounded retry with capped exponential backoff.
///
/// Attempt `n` (1-based) waits `base * 2^(n-1)`, capped at `max_backoff_ms`,
/// plus a uniform jitter in `0..=jitter_ms`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub jitter_ms: u64,
}

pub trait BackoffPolicy {
    fn delay_for_attempt(&self, attempt: usize) -> Duration;
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_backoff_ms: 120,
            max_backoff_ms: 2_000,
            jitter_ms: 0,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts; for tests.
    #[must_use]
    pub fn immediate(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            base_backoff_ms: 0,
            max_backoff_ms: 0,
            jitter_ms: 0,
        }
    }

    #[must_use]
    pub fn allows_another(&self, attempt: usize) -> bool {
        attempt < self.max_attempts.max(1)
    }
}

impl BackoffPolicy for RetryPolicy {
    fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exp = attempt.saturating_sub(1).min(32) as u32;
        let base = self
            .base_backoff_ms
            .saturating_mul(1_u64 << exp)
            .min(self.max_backoff_ms);
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        };
        Duration::from_millis(base.saturating_add(jitter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_capped() {
        let policy = RetryPolicy {
            max_attempts: 7,
            base_backoff_ms: 100,
            max_backoff_ms: 500,
            jitter_ms: 0,
        };
        let delays: Vec<u64> = (1..=5)
            .map(|a| policy.delay_for_attempt(a).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
    }

    #[test]
    fn jitter_stays_within_bound() {
        let policy = RetryPolicy {
            jitter_ms: 50,
            ..RetryPolicy::default()
        };
        for _ in 0..64 {
            let d = policy.delay_for_attempt(1).as_millis() as u64;
            assert!((120..=170).contains(&d));
        }
    }

    #[test]
    fn attempt_budget_is_at_least_one() {
        let policy = RetryPolicy::immediate(0);
        assert!(!policy.allows_another(1));
        assert!(RetryPolicy::immediate(3).allows_another(2));
    }
}
