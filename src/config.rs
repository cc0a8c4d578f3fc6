//! Tabguard engine configuration.

use crate::LockError;
use std::time::Duration;

/// Default PBKDF2 iteration count for new credential records.
pub const DEFAULT_ITERATIONS: u32 = 120_000;

/// Configuration for the per-page lock enforcement engine.
///
/// The defaults reproduce the shipped behaviour; embedders mostly override
/// the timing fields in tests.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Consecutive failed verifications before the cooldown engages.
    pub max_attempts: u32,

    /// How long credential input stays disabled after `max_attempts` failures.
    pub cooldown: Duration,

    /// Interval of the live cooldown countdown.
    pub cooldown_tick: Duration,

    /// Iteration count used when creating credential records.
    pub default_iterations: u32,

    /// Lowest iteration count accepted when creating credential records.
    pub min_iterations: u32,

    /// Debounce window for tamper repair (one animation frame).
    pub repair_debounce: Duration,

    /// Fixed unlock durations offered after successful verification, in minutes.
    pub preset_minutes: &'static [u32],

    /// Upper bound of the custom unlock duration, in minutes.
    pub max_custom_minutes: u32,

    /// Initial value of the custom unlock duration, in minutes.
    pub default_custom_minutes: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            cooldown: Duration::from_secs(15),
            cooldown_tick: Duration::from_secs(1),
            default_iterations: DEFAULT_ITERATIONS,
            min_iterations: 100_000,
            repair_debounce: Duration::from_millis(16),
            preset_minutes: &[5, 15, 60],
            max_custom_minutes: 240,
            default_custom_minutes: 30,
        }
    }
}

impl EngineConfig {
    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), LockError> {
        if self.max_attempts == 0 {
            return Err(LockError::ConfigError(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.cooldown.is_zero() {
            return Err(LockError::ConfigError(
                "cooldown cannot be zero".to_string(),
            ));
        }
        if self.cooldown_tick.is_zero() {
            return Err(LockError::ConfigError(
                "cooldown_tick cannot be zero".to_string(),
            ));
        }
        if self.default_iterations < self.min_iterations {
            return Err(LockError::ConfigError(format!(
                "default_iterations ({}) is below min_iterations ({})",
                self.default_iterations, self.min_iterations
            )));
        }
        if self.max_custom_minutes == 0 {
            return Err(LockError::ConfigError(
                "max_custom_minutes must be at least 1".to_string(),
            ));
        }
        if self.preset_minutes.iter().any(|m| *m == 0) {
            return Err(LockError::ConfigError(
                "preset_minutes cannot contain zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Cooldown length in milliseconds.
    pub fn cooldown_millis(&self) -> i64 {
        i64::try_from(self.cooldown.as_millis()).unwrap_or(i64::MAX)
    }

    /// Clamp a custom duration into `1..=max_custom_minutes`.
    pub fn clamp_custom_minutes(&self, minutes: u32) -> u32 {
        minutes.clamp(1, self.max_custom_minutes)
    }
}
