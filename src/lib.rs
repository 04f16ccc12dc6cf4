//! Storefront Throttle Library
//!
//! Rate limiting for a chat-bot storefront: a per-user, per-category sliding
//! window limiter with exponential backoff, plus the guards that put it in
//! front of chat handlers, authentication and payments.

pub mod config;
pub mod guards;
pub mod metrics;
pub mod rate_limit;

pub use guards::{AuthGuard, ConversationGuard, GuardError, PaymentGuard};
pub use rate_limit::{Admission, Category, RateLimitConfig, RateLimiter, RemainingAttempts};
