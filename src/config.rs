// Configuration File Support
//
// Configuration for the storefront throttling layer, read from a TOML file with
// environment variable overrides. A missing file yields the defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::guards::SuspiciousActivityConfig;
use crate::rate_limit::RateLimitConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Per-category quotas and backoff
    pub rate_limit: RateLimitConfig,

    /// Payment fraud counter
    pub payment: SuspiciousActivityConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed or
    /// fails validation. If the file does not exist, returns the defaults with
    /// environment overrides applied.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            let config = Self::default().apply_env_overrides();
            config.validate()?;
            return Ok(config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file from {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file from {:?}", path))?;

        let config = config.apply_env_overrides();
        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Environment variables take precedence over config file values:
    /// - STOREFRONT_LOG_LEVEL
    /// - STOREFRONT_LOG_FORMAT
    /// - STOREFRONT_RATE_LIMIT_MESSAGES
    /// - STOREFRONT_RATE_LIMIT_COMMANDS
    /// - STOREFRONT_RATE_LIMIT_IDLE_TTL_SECS
    /// - STOREFRONT_FRAUD_THRESHOLD
    fn apply_env_overrides(mut self) -> Self {
        if let Ok(level) = std::env::var("STOREFRONT_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("STOREFRONT_LOG_FORMAT") {
            self.logging.format = format;
        }

        self.rate_limit = self.rate_limit.apply_env_overrides();

        if let Ok(threshold) = std::env::var("STOREFRONT_FRAUD_THRESHOLD") {
            if let Ok(threshold) = threshold.parse::<u32>() {
                self.payment.threshold = threshold;
            }
        }

        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        match self.logging.format.to_lowercase().as_str() {
            "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: pretty, compact",
                self.logging.format
            ),
        }

        self.rate_limit
            .validate()
            .context("Invalid [rate_limit] section")?;

        if self.payment.reset_hours == 0 {
            anyhow::bail!("Payment fraud reset period must be at least one hour");
        }

        Ok(())
    }

    /// Parse the configured log level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging
            .level
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}
