//! Failed-attempt throttle for password verification.
//!
//! `Idle` counts consecutive failures; reaching the threshold moves to
//! `Cooling` until the deadline passes. While cooling, attempts are
//! rejected before the KDF is consulted and do not consume an attempt.

use crate::LockError;

/// Observable throttle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleState {
    /// Attempts are accepted.
    Idle,
    /// Attempts are rejected until `until_ms`.
    Cooling {
        /// Unix milliseconds at which attempts resume.
        until_ms: i64,
    },
}

/// Result of recording a failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Still idle; this many attempts remain before cooldown.
    AttemptsLeft(u32),
    /// Threshold reached; cooling until the given deadline.
    CoolingDown {
        /// Unix milliseconds at which attempts resume.
        until_ms: i64,
    },
}

/// Per-page failed-attempt counter with timed lockout.
#[derive(Debug, Clone)]
pub struct Throttle {
    max_attempts: u32,
    cooldown_ms: i64,
    failed_attempts: u32,
    cooldown_until: i64,
}

impl Throttle {
    /// Create an idle throttle.
    pub fn new(max_attempts: u32, cooldown_ms: i64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            cooldown_ms,
            failed_attempts: 0,
            cooldown_until: 0,
        }
    }

    /// Consecutive failures since the last reset.
    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    /// Cooldown deadline in Unix milliseconds, or 0 when idle.
    pub fn cooldown_until(&self) -> i64 {
        self.cooldown_until
    }

    /// Current state as of `now_ms`.
    pub fn state(&self, now_ms: i64) -> ThrottleState {
        if self.cooldown_until != 0 && now_ms < self.cooldown_until {
            ThrottleState::Cooling {
                until_ms: self.cooldown_until,
            }
        } else {
            ThrottleState::Idle
        }
    }

    /// Gate a verification attempt.
    ///
    /// A lapsed cooldown is settled here, so a correct password succeeds
    /// immediately even if the countdown has not ticked yet.
    pub fn admit(&mut self, now_ms: i64) -> Result<(), LockError> {
        match self.state(now_ms) {
            ThrottleState::Cooling { until_ms } => Err(LockError::CoolingDown {
                remaining_secs: remaining_secs(until_ms, now_ms),
            }),
            ThrottleState::Idle => {
                if self.cooldown_until != 0 {
                    self.reset();
                }
                Ok(())
            }
        }
    }

    /// Record a failed verification.
    pub fn record_failure(&mut self, now_ms: i64) -> FailureOutcome {
        self.failed_attempts += 1;
        if self.failed_attempts >= self.max_attempts {
            self.cooldown_until = now_ms + self.cooldown_ms;
            return FailureOutcome::CoolingDown {
                until_ms: self.cooldown_until,
            };
        }
        FailureOutcome::AttemptsLeft(self.max_attempts - self.failed_attempts)
    }

    /// Record a successful verification: counters reset, cooldown cancelled.
    pub fn record_success(&mut self) {
        self.reset();
    }

    /// Advance the countdown.
    ///
    /// Returns the whole seconds remaining, or `None` once the cooldown has
    /// elapsed (the throttle is then back to `Idle` with zero failures).
    pub fn tick(&mut self, now_ms: i64) -> Option<u64> {
        if self.cooldown_until == 0 {
            return None;
        }
        let remaining = remaining_secs(self.cooldown_until, now_ms);
        if remaining == 0 {
            self.reset();
            return None;
        }
        Some(remaining)
    }

    fn reset(&mut self) {
        self.failed_attempts = 0;
        self.cooldown_until = 0;
    }
}

/// Whole seconds until `until_ms`, rounded up.
pub fn remaining_secs(until_ms: i64, now_ms: i64) -> u64 {
    let remaining = (until_ms - now_ms).max(0);
    u64::try_from((remaining + 999) / 1000).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000_000;

    #[test]
    fn test_counts_down_attempts() {
        let mut throttle = Throttle::new(3, 15_000);
        assert_eq!(throttle.record_failure(T0), FailureOutcome::AttemptsLeft(2));
        assert_eq!(throttle.record_failure(T0), FailureOutcome::AttemptsLeft(1));
        assert_eq!(
            throttle.record_failure(T0),
            FailureOutcome::CoolingDown { until_ms: T0 + 15_000 }
        );
        assert_eq!(throttle.state(T0), ThrottleState::Cooling { until_ms: T0 + 15_000 });
    }

    #[test]
    fn test_rejects_while_cooling_without_consuming_attempt() {
        let mut throttle = Throttle::new(3, 15_000);
        for _ in 0..3 {
            throttle.record_failure(T0);
        }
        let result = throttle.admit(T0 + 1_000);
        assert_eq!(result, Err(LockError::CoolingDown { remaining_secs: 14 }));
        assert_eq!(throttle.failed_attempts(), 3);
    }

    #[test]
    fn test_tick_resets_when_elapsed() {
        let mut throttle = Throttle::new(3, 15_000);
        for _ in 0..3 {
            throttle.record_failure(T0);
        }
        assert_eq!(throttle.tick(T0 + 500), Some(15));
        assert_eq!(throttle.tick(T0 + 14_001), Some(1));
        assert_eq!(throttle.tick(T0 + 15_000), None);
        assert_eq!(throttle.failed_attempts(), 0);
        assert_eq!(throttle.state(T0 + 15_000), ThrottleState::Idle);
    }

    #[test]
    fn test_admit_settles_lapsed_cooldown() {
        let mut throttle = Throttle::new(3, 15_000);
        for _ in 0..3 {
            throttle.record_failure(T0);
        }
        assert!(throttle.admit(T0 + 15_000).is_ok());
        assert_eq!(throttle.failed_attempts(), 0);
        assert_eq!(throttle.cooldown_until(), 0);
    }

    #[test]
    fn test_success_resets_counters() {
        let mut throttle = Throttle::new(3, 15_000);
        throttle.record_failure(T0);
        throttle.record_failure(T0);
        throttle.record_success();
        assert_eq!(throttle.failed_attempts(), 0);
        assert_eq!(throttle.record_failure(T0), FailureOutcome::AttemptsLeft(2));
    }

    #[test]
    fn test_remaining_secs_rounds_up() {
        assert_eq!(remaining_secs(T0 + 1, T0), 1);
        assert_eq!(remaining_secs(T0 + 1_000, T0), 1);
        assert_eq!(remaining_secs(T0 + 1_001, T0), 2);
        assert_eq!(remaining_secs(T0, T0 + 5), 0);
    }
}
