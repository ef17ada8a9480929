//! Exponential backoff with full jitter for the reconnect task.
//!
//! Adapted from the backoff/jitter policy used for re-initialising
//! consumer streams: base 1 s, cap 60 s, per spec.md §4.1.

use rand::Rng;
use rand::rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }
}

/// Tracks reconnect attempts for one venue connection and produces the next
/// sleep duration. Full jitter: `sleep = random(0, min(cap, base * 2^attempt))`.
#[derive(Debug, Clone)]
pub struct ReconnectionState {
    policy: BackoffPolicy,
    attempt: u32,
}

impl ReconnectionState {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Attempts since the last successful connection.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Reset after a successful (re)connect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    fn ceiling(&self) -> Duration {
        let scaled = self.policy.base.saturating_mul(1u32.checked_shl(self.attempt).unwrap_or(u32::MAX));
        scaled.min(self.policy.cap)
    }

    /// Advance the attempt counter and return the next sleep duration.
    pub fn next_delay(&mut self) -> Duration {
        let ceiling = self.ceiling();
        self.attempt = self.attempt.saturating_add(1);

        if ceiling.is_zero() {
            return Duration::ZERO;
        }
        let millis = ceiling.as_millis().min(u64::MAX as u128) as u64;
        let jittered = rng().random_range(0..=millis);
        Duration::from_millis(jittered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_never_exceeds_cap() {
        let mut state = ReconnectionState::new(BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(60)));
        for _ in 0..20 {
            let delay = state.next_delay();
            assert!(delay <= Duration::from_secs(60));
        }
    }

    #[test]
    fn test_attempt_increments_each_call() {
        let mut state = ReconnectionState::new(BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(60)));
        assert_eq!(state.attempt(), 0);
        state.next_delay();
        assert_eq!(state.attempt(), 1);
        state.next_delay();
        assert_eq!(state.attempt(), 2);
    }

    #[test]
    fn test_reset_returns_attempt_to_zero() {
        let mut state = ReconnectionState::new(BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(60)));
        state.next_delay();
        state.next_delay();
        state.reset();
        assert_eq!(state.attempt(), 0);
    }

    #[test]
    fn test_ceiling_caps_after_enough_attempts() {
        let mut state = ReconnectionState::new(BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(60)));
        for _ in 0..10 {
            state.next_delay();
        }
        assert_eq!(state.ceiling(), Duration::from_secs(60));
    }
}
