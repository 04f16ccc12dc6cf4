//! Rate Limiting Module
//!
//! Per-user rate limiting with sliding windows and exponential backoff for the
//! storefront's chat commands, messages, authentication and payment attempts.
//!
//! # Features
//!
//! - Sliding-window attempt counting per (actor, category)
//! - Independent quotas per category with their own backoff factor
//! - Advisory exponential backoff reported after repeated violations
//! - Fail-open on missing identity or internal faults
//! - Periodic sweep of idle keys to bound memory
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Rate Limiter                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌──────────┐  │
//! │  │ message   │  │ command   │  │ auth      │  │ payment  │  │
//! │  └───────────┘  └───────────┘  └───────────┘  └──────────┘  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │     Attempt Store (per-key mutex, idle sweeper)      │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod backoff;
pub mod category;
pub mod clock;
pub mod config;
pub mod error;
pub mod limiter;
pub mod store;

pub use backoff::BackoffPolicy;
pub use category::Category;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CategoryLimit, RateLimitConfig};
pub use error::RateLimitError;
pub use limiter::{Admission, FailOpenReason, RateLimiter, RemainingAttempts};
pub use store::AttemptStore;
