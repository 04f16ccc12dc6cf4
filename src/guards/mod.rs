//! Storefront Guards
//!
//! Thin collaborators that sit in front of the chat handlers, the
//! authentication flow and the payment flow. Each one receives the shared
//! [`RateLimiter`](crate::rate_limit::RateLimiter) explicitly at construction.

pub mod auth;
pub mod conversation;
pub mod payment;

pub use auth::AuthGuard;
pub use conversation::{ConversationGuard, CooldownNotice};
pub use payment::{PaymentGuard, SuspiciousActivityConfig, SuspiciousActivityTracker};

/// Reasons a guarded action was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardError {
    /// Actor hit a rate limit
    #[error("{message}")]
    Throttled {
        /// Category that refused the attempt
        category: String,
        /// Suggested wait in seconds
        wait_secs: u64,
        /// Text shown to the actor
        message: String,
    },

    /// Payment activity crossed the fraud threshold
    #[error("Suspicious payment activity detected. Please contact support.")]
    SuspiciousActivity {
        /// Attempts seen in the current period
        attempts: u32,
    },
}

impl GuardError {
    pub fn wait_secs(&self) -> u64 {
        match self {
            GuardError::Throttled { wait_secs, .. } => *wait_secs,
            GuardError::SuspiciousActivity { .. } => 0,
        }
    }
}
