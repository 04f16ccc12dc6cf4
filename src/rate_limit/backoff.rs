// Exponential backoff for repeated rate limit violations
//
// wait = min(base * factor^(violations - 1), max)
//
// The wait is advisory. It is reported to the throttled actor and never used
// to gate admission.

use super::config::{CategoryLimit, RateLimitConfig};

/// Backoff bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Wait for the first violation in seconds
    pub base_wait_secs: u64,
    /// Ceiling in seconds
    pub max_wait_secs: u64,
}

impl BackoffPolicy {
    pub fn new(base_wait_secs: u64, max_wait_secs: u64) -> Self {
        Self {
            base_wait_secs,
            max_wait_secs,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.base_wait_secs, config.max_wait_secs)
    }

    /// Backoff wait in whole seconds for a violation count
    ///
    /// Returns 0 when there are no violations. Saturates at `max_wait_secs`
    /// for any factor, including huge exponents.
    pub fn wait_secs(&self, factor: f64, violations: u32) -> u64 {
        if violations == 0 {
            return 0;
        }

        let exponent = i32::try_from(violations - 1).unwrap_or(i32::MAX);
        let wait = self.base_wait_secs as f64 * factor.powi(exponent);
        let max = self.max_wait_secs as f64;

        if wait.is_nan() || wait >= max {
            self.max_wait_secs
        } else {
            wait as u64
        }
    }

    /// Backoff wait for a category's configured factor
    pub fn wait_for(&self, limit: &CategoryLimit, violations: u32) -> u64 {
        self.wait_secs(limit.backoff_factor, violations)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}
