//! Rate Limit Configuration
//!
//! Per-category quotas and the backoff/sweep tunables shared by all categories.
//! The configuration is fixed once a limiter is constructed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::category::Category;
use super::error::{RateLimitError, RateLimitResult};

/// Default quotas
pub const DEFAULT_MESSAGE_LIMIT: u32 = 30; // messages per minute
pub const DEFAULT_COMMAND_LIMIT: u32 = 10; // commands per minute
pub const DEFAULT_AUTH_LIMIT: u32 = 5; // auth attempts per 5 minutes
pub const DEFAULT_PAYMENT_LIMIT: u32 = 3; // payment attempts per 10 minutes

/// Backoff bounds shared by every category
pub const DEFAULT_BASE_WAIT_SECS: u64 = 5;
pub const DEFAULT_MAX_WAIT_SECS: u64 = 3600;

/// Idle keys older than this are dropped by the sweeper
pub const DEFAULT_IDLE_TTL_SECS: u64 = 24 * 3600;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Longest span converted to a chrono duration (about a century)
const MAX_SPAN_SECS: u64 = 100 * 365 * 24 * 3600;

/// Whole seconds as a chrono duration, clamped so timestamp arithmetic cannot overflow
pub fn span(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_SPAN_SECS) as i64)
}

/// Quota for a single category
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryLimit {
    /// Maximum admitted attempts per window
    pub limit: u32,

    /// Sliding window length in seconds
    pub window_secs: u64,

    /// Multiplier applied to the backoff per violation
    pub backoff_factor: f64,
}

impl CategoryLimit {
    pub fn new(limit: u32, window_secs: u64, backoff_factor: f64) -> Self {
        Self {
            limit,
            window_secs,
            backoff_factor,
        }
    }

    /// Window as a chrono duration, for comparisons against wall-clock stamps
    pub fn window(&self) -> chrono::Duration {
        span(self.window_secs)
    }
}

/// Rate limit configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Backoff wait for the first violation
    pub base_wait_secs: u64,

    /// Ceiling for the backoff wait
    pub max_wait_secs: u64,

    /// Keys with no activity for this long are removed by the sweeper
    pub idle_ttl_secs: u64,

    /// Period of the background sweeper
    pub sweep_interval_secs: u64,

    /// Quota per category tag
    pub categories: HashMap<String, CategoryLimit>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let categories = [
            (Category::Message, CategoryLimit::new(DEFAULT_MESSAGE_LIMIT, 60, 2.0)),
            (Category::Command, CategoryLimit::new(DEFAULT_COMMAND_LIMIT, 60, 2.0)),
            (Category::Auth, CategoryLimit::new(DEFAULT_AUTH_LIMIT, 300, 4.0)),
            (Category::Payment, CategoryLimit::new(DEFAULT_PAYMENT_LIMIT, 600, 5.0)),
        ]
        .into_iter()
        .map(|(category, limit)| (category.as_str().to_string(), limit))
        .collect();

        Self {
            base_wait_secs: DEFAULT_BASE_WAIT_SECS,
            max_wait_secs: DEFAULT_MAX_WAIT_SECS,
            idle_ttl_secs: DEFAULT_IDLE_TTL_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            categories,
        }
    }
}

impl RateLimitConfig {
    /// Create a new rate limit configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Self {
        Self::default().apply_env_overrides()
    }

    /// Apply `STOREFRONT_*` overrides. Unparseable or zero values are ignored.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("STOREFRONT_RATE_LIMIT_MESSAGES") {
            if let Ok(limit) = val.parse::<u32>() {
                if limit > 0 {
                    self.set_limit(Category::Message, limit);
                }
            }
        }

        if let Ok(val) = std::env::var("STOREFRONT_RATE_LIMIT_COMMANDS") {
            if let Ok(limit) = val.parse::<u32>() {
                if limit > 0 {
                    self.set_limit(Category::Command, limit);
                }
            }
        }

        if let Ok(val) = std::env::var("STOREFRONT_RATE_LIMIT_IDLE_TTL_SECS") {
            if let Ok(ttl) = val.parse::<u64>() {
                if ttl > 0 {
                    self.idle_ttl_secs = ttl;
                }
            }
        }

        self
    }

    fn set_limit(&mut self, category: Category, limit: u32) {
        if let Some(entry) = self.categories.get_mut(category.as_str()) {
            entry.limit = limit;
        }
    }

    /// Replace or add the quota for a category tag
    pub fn with_category(mut self, category: impl Into<String>, limit: CategoryLimit) -> Self {
        self.categories.insert(category.into(), limit);
        self
    }

    /// Look up a category's quota without any fallback
    pub fn category(&self, category: &str) -> Option<&CategoryLimit> {
        self.categories.get(category)
    }

    /// Quota used for unknown category tags
    pub fn default_category(&self) -> Option<&CategoryLimit> {
        self.categories.get(Category::Message.as_str())
    }

    pub fn idle_ttl(&self) -> chrono::Duration {
        span(self.idle_ttl_secs)
    }

    /// Sweeper period, never shorter than one second
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// Validate the configuration
    pub fn validate(&self) -> RateLimitResult<()> {
        if self.default_category().is_none() {
            return Err(RateLimitError::InvalidConfig(
                "the 'message' category must be configured".to_string(),
            ));
        }

        for (name, limit) in &self.categories {
            if limit.limit == 0 {
                return Err(RateLimitError::InvalidConfig(format!(
                    "category '{}' must allow at least one attempt",
                    name
                )));
            }
            if limit.window_secs == 0 {
                return Err(RateLimitError::InvalidConfig(format!(
                    "category '{}' has an empty window",
                    name
                )));
            }
            if !limit.backoff_factor.is_finite() || limit.backoff_factor < 1.0 {
                return Err(RateLimitError::InvalidConfig(format!(
                    "category '{}' backoff factor must be a finite number >= 1, got {}",
                    name, limit.backoff_factor
                )));
            }
        }

        if self.base_wait_secs > self.max_wait_secs {
            return Err(RateLimitError::InvalidConfig(format!(
                "base wait {}s exceeds max wait {}s",
                self.base_wait_secs, self.max_wait_secs
            )));
        }

        if self.sweep_interval_secs == 0 {
            return Err(RateLimitError::InvalidConfig(
                "sweep interval must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RateLimitConfig::default();
        assert_eq!(config.category("message").unwrap().limit, DEFAULT_MESSAGE_LIMIT);
        assert_eq!(config.category("command").unwrap().limit, DEFAULT_COMMAND_LIMIT);
        assert_eq!(config.category("auth").unwrap().window_secs, 300);
        assert_eq!(config.category("payment").unwrap().backoff_factor, 5.0);
        assert_eq!(config.base_wait_secs, 5);
        assert_eq!(config.max_wait_secs, 3600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_category_has_no_direct_entry() {
        let config = RateLimitConfig::default();
        assert!(config.category("refund").is_none());
        assert_eq!(config.default_category(), config.category("message"));
    }

    #[test]
    fn test_validation_rejects_missing_message_category() {
        let mut config = RateLimitConfig::default();
        config.categories.remove("message");
        assert!(matches!(
            config.validate(),
            Err(RateLimitError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validation_rejects_zero_limit_and_window() {
        let config =
            RateLimitConfig::default().with_category("auth", CategoryLimit::new(0, 300, 4.0));
        assert!(config.validate().is_err());

        let config =
            RateLimitConfig::default().with_category("auth", CategoryLimit::new(5, 0, 4.0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_shrinking_backoff() {
        let config =
            RateLimitConfig::default().with_category("auth", CategoryLimit::new(5, 300, 0.5));
        assert!(config.validate().is_err());

        let config =
            RateLimitConfig::default().with_category("auth", CategoryLimit::new(5, 300, f64::NAN));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_inverted_wait_bounds() {
        let config = RateLimitConfig {
            base_wait_secs: 10,
            max_wait_secs: 5,
            ..RateLimitConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("STOREFRONT_RATE_LIMIT_MESSAGES", "12");
        std::env::set_var("STOREFRONT_RATE_LIMIT_COMMANDS", "not-a-number");

        let config = RateLimitConfig::from_env();
        assert_eq!(config.category("message").unwrap().limit, 12);
        assert_eq!(config.category("command").unwrap().limit, DEFAULT_COMMAND_LIMIT);

        std::env::remove_var("STOREFRONT_RATE_LIMIT_MESSAGES");
        std::env::remove_var("STOREFRONT_RATE_LIMIT_COMMANDS");
    }

    #[test]
    fn test_config_serialization() {
        let config = RateLimitConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: RateLimitConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_window_duration() {
        let limit = CategoryLimit::new(3, 600, 5.0);
        assert_eq!(limit.window(), chrono::Duration::seconds(600));
    }

    #[test]
    fn test_zero_sweep_interval_is_floored() {
        let config = RateLimitConfig {
            sweep_interval_secs: 0,
            ..RateLimitConfig::default()
        };
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_huge_spans_are_clamped() {
        let limit = CategoryLimit::new(3, u64::MAX, 5.0);
        assert_eq!(limit.window(), span(MAX_SPAN_SECS));
    }
}
