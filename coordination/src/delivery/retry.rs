//! Rate-limit retry policy.
//!
//! The policy is a pure function of how many attempts have been made and the
//! wait the platform asked for, so it can be tested without a transport.

use std::time::Duration;

/// Total attempts (first try included) before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Wait used when the platform gives no hint.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(5);

/// What to do after a rate-limited attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep, then try again.
    Wait(Duration),
    /// Attempt budget spent.
    GiveUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub default_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            default_backoff: DEFAULT_BACKOFF,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, default_backoff: Duration) -> Self {
        Self {
            max_attempts,
            default_backoff,
        }
    }

    /// Decide after `attempts` rate-limited tries, given the platform's hint.
    pub fn decide(&self, attempts: u32, hint: Option<Duration>) -> RetryDecision {
        if attempts >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Wait(hint.unwrap_or(self.default_backoff))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uses_platform_hint() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(1, Some(Duration::from_millis(1500))),
            RetryDecision::Wait(Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_falls_back_to_default_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(3, None),
            RetryDecision::Wait(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_gives_up_at_attempt_budget() {
        let policy = RetryPolicy::default();
        assert!(matches!(policy.decide(9, None), RetryDecision::Wait(_)));
        assert_eq!(policy.decide(10, None), RetryDecision::GiveUp);
        assert_eq!(
            policy.decide(11, Some(Duration::from_secs(1))),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn test_single_attempt_policy_never_waits() {
        let policy = RetryPolicy::new(1, Duration::from_secs(5));
        assert_eq!(policy.decide(1, None), RetryDecision::GiveUp);
    }
}
