//! Rate Limit Error Types
//!
//! Faults raised inside the limiter's bookkeeping. Public limiter operations
//! never return these; they are logged and converted into fail-open outcomes.

/// Error types for rate limiting
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// A lock guarding limiter state was poisoned by a panicking thread
    #[error("Rate limiter state lock poisoned: {0}")]
    LockPoisoned(&'static str),

    /// Category tag has no configured quota
    #[error("Unknown rate limit category: {0}")]
    UnknownCategory(String),

    /// Invalid configuration
    #[error("Invalid rate limit configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for limiter internals
pub type RateLimitResult<T> = std::result::Result<T, RateLimitError>;
