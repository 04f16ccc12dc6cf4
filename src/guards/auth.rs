//! Authentication guard
//!
//! Brute-force protection for sensitive actions: every attempt is counted
//! against the `auth` quota before the action runs.

use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use tracing::warn;

use super::GuardError;
use crate::rate_limit::{Admission, Category, RateLimiter};

pub const AUTH_THROTTLED_MESSAGE: &str =
    "Too many authentication attempts. Please try again later.";

/// Guard for authentication and other sensitive actions
#[derive(Debug, Clone)]
pub struct AuthGuard<A = i64> {
    limiter: RateLimiter<A>,
}

impl<A> AuthGuard<A>
where
    A: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    pub fn new(limiter: RateLimiter<A>) -> Self {
        Self { limiter }
    }

    /// Count an attempt against the `auth` quota
    pub fn check(&self, actor: Option<&A>) -> Result<(), GuardError> {
        match self.limiter.check_limit(actor, Category::Auth) {
            Admission::Rejected {
                retry_after_secs, ..
            } => {
                warn!(?actor, "Authentication attempt throttled");
                Err(GuardError::Throttled {
                    category: Category::Auth.to_string(),
                    wait_secs: retry_after_secs,
                    message: AUTH_THROTTLED_MESSAGE.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Run `action` only if the attempt is within the `auth` quota
    pub async fn guard<F, Fut, T>(&self, actor: Option<&A>, action: F) -> Result<T, GuardError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.check(actor)?;
        Ok(action().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::{CategoryLimit, RateLimitConfig};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn guard() -> AuthGuard<i64> {
        let config =
            RateLimitConfig::default().with_category("auth", CategoryLimit::new(2, 300, 4.0));
        AuthGuard::new(RateLimiter::new(config))
    }

    #[tokio::test]
    async fn test_action_runs_within_quota() {
        let guard = guard();
        let result = guard.guard(Some(&5), || async { 42 }).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn test_action_skipped_when_throttled() {
        let guard = guard();
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            let _ = guard
                .guard(Some(&5), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                })
                .await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let err = guard.check(Some(&5)).unwrap_err();
        assert_eq!(err.to_string(), AUTH_THROTTLED_MESSAGE);
        assert!(err.wait_secs() > 0);
    }

    #[test]
    fn test_auth_does_not_consume_message_quota() {
        let limiter: RateLimiter<i64> = RateLimiter::new(
            RateLimitConfig::default().with_category("auth", CategoryLimit::new(1, 300, 4.0)),
        );
        let guard = AuthGuard::new(limiter.clone());

        guard.check(Some(&5)).unwrap();
        assert!(guard.check(Some(&5)).is_err());
        assert_eq!(
            limiter.get_remaining_attempts(Some(&5), "message").remaining,
            limiter.config().category("message").unwrap().limit
        );
    }
}
