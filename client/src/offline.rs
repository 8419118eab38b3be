//! Decides when to stop retrying the server and play locally instead.

use std::time::Duration;

use crate::backoff::retry_delay;

/// Knobs for the give-up decision during session join.
#[derive(Clone, Copy, Debug)]
pub struct FallbackPolicy {
    /// Dial failures tolerated before the session goes local.
    pub max_connect_attempts: u32,
    /// Delay before the first retry; later retries double up to
    /// [`FallbackPolicy::max_retry_delay`].
    pub retry_base_delay: Duration,
    pub max_retry_delay: Duration,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            max_connect_attempts: 3,
            retry_base_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(8),
        }
    }
}

/// What to do after a failed connection attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FallbackDecision {
    RetryAfter(Duration),
    /// The budget is spent; switch to hot-seat play.
    GoOffline,
}

/// Failure counter over [`FallbackPolicy`]. One instance per join attempt.
#[derive(Debug)]
pub struct OfflineFallback {
    policy: FallbackPolicy,
    failures: u32,
}

impl OfflineFallback {
    pub fn new(policy: FallbackPolicy) -> Self {
        Self {
            policy,
            failures: 0,
        }
    }

    /// Records one failed attempt and returns the next step.
    pub fn record_failure(&mut self) -> FallbackDecision {
        self.failures += 1;
        if self.failures >= self.policy.max_connect_attempts {
            FallbackDecision::GoOffline
        } else {
            FallbackDecision::RetryAfter(retry_delay(
                self.policy.retry_base_delay,
                self.failures,
                self.policy.max_retry_delay,
            ))
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn third_failure_goes_offline() {
        let mut fallback = OfflineFallback::new(FallbackPolicy::default());
        assert_eq!(
            fallback.record_failure(),
            FallbackDecision::RetryAfter(Duration::from_secs(1))
        );
        assert_eq!(
            fallback.record_failure(),
            FallbackDecision::RetryAfter(Duration::from_secs(2))
        );
        assert_eq!(fallback.record_failure(), FallbackDecision::GoOffline);
        assert_eq!(fallback.failures(), 3);
    }

    #[test]
    fn single_attempt_policy_never_retries() {
        let mut fallback = OfflineFallback::new(FallbackPolicy {
            max_connect_attempts: 1,
            ..FallbackPolicy::default()
        });
        assert_eq!(fallback.record_failure(), FallbackDecision::GoOffline);
    }
}
