//! Rate Limiter
//!
//! Sliding-window admission per (actor, category) with an escalating, advisory
//! backoff after repeated rejections. Admission is judged only by the number of
//! attempts inside the window; the backoff is reported to callers so they can
//! tell the actor how long to wait.
//!
//! The limiter never fails its caller. Missing actors and internal faults are
//! logged and admitted by policy, surfaced as [`Admission::FailOpen`].

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::backoff::BackoffPolicy;
use super::category::Category;
use super::clock::{Clock, SystemClock};
use super::config::{CategoryLimit, RateLimitConfig, DEFAULT_MESSAGE_LIMIT};
use super::error::{RateLimitError, RateLimitResult};
use super::store::{AttemptStore, KeyState, LimitKey};
use crate::metrics;

/// Used only if a configuration without a `message` entry slips past validation
const FALLBACK_LIMIT: CategoryLimit = CategoryLimit {
    limit: DEFAULT_MESSAGE_LIMIT,
    window_secs: 60,
    backoff_factor: 2.0,
};

/// Why a check was admitted without being counted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailOpenReason {
    /// No actor identity was supplied
    MissingActor,
    /// Internal bookkeeping failed
    Internal(String),
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Admission {
    /// Attempt recorded
    Admitted {
        /// Attempts left in the current window
        remaining: u32,
    },
    /// Quota for the window is used up
    Rejected {
        /// Advisory cooldown reported to the actor
        retry_after_secs: u64,
        /// Violations recorded so far for this key
        violations: u32,
    },
    /// Allowed by policy without being counted
    FailOpen { reason: FailOpenReason },
}

impl Admission {
    /// Whether the caller may proceed
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Admission::Rejected { .. })
    }

    pub fn is_rejected(&self) -> bool {
        !self.is_allowed()
    }

    /// Label used for logs and metrics
    pub fn outcome(&self) -> &'static str {
        match self {
            Admission::Admitted { .. } => "admitted",
            Admission::Rejected { .. } => "rejected",
            Admission::FailOpen { .. } => "fail_open",
        }
    }
}

/// Quota left for an actor in a category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemainingAttempts {
    /// Attempts that would still be admitted in the current window
    pub remaining: u32,
    /// Seconds the actor should wait (window expiry or backoff, whichever is longer)
    pub wait_secs: u64,
}

impl RemainingAttempts {
    pub fn new(remaining: u32, wait_secs: u64) -> Self {
        Self {
            remaining,
            wait_secs,
        }
    }

    /// Zeroed answer for invalid input or faults
    pub fn none() -> Self {
        Self::default()
    }
}

/// Per-actor, per-category rate limiter
///
/// Cloning is cheap and every clone shares the same state, so one limiter can
/// be handed to each collaborator that needs it.
#[derive(Debug, Clone)]
pub struct RateLimiter<A = i64> {
    config: Arc<RateLimitConfig>,
    backoff: BackoffPolicy,
    store: Arc<AttemptStore<A>>,
    clock: Arc<dyn Clock>,
}

impl<A> RateLimiter<A>
where
    A: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    /// Create a limiter that reads the system clock
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create with default configuration
    pub fn default_config() -> Self {
        Self::new(RateLimitConfig::default())
    }

    /// Create a limiter with an explicit clock source
    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            backoff: BackoffPolicy::from_config(&config),
            config: Arc::new(config),
            store: Arc::new(AttemptStore::new()),
            clock,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check whether `actor` may perform an action of `category` now
    ///
    /// Admitted attempts are recorded. Rejections bump the violation counter
    /// and report the cooldown, but never lock the actor out beyond the
    /// count in the window.
    pub fn check_limit(&self, actor: Option<&A>, category: impl AsRef<str>) -> Admission {
        let requested = category.as_ref();

        let Some(actor) = actor else {
            warn!(category = requested, "Invalid actor provided to rate limiter");
            let (resolved, _) = self.resolve(requested);
            return self.finish(
                resolved,
                Admission::FailOpen {
                    reason: FailOpenReason::MissingActor,
                },
            );
        };

        let (resolved, limit) = self.resolve(requested);
        let admission = self.try_check(actor, resolved, &limit).unwrap_or_else(|err| {
            error!(?actor, category = requested, error = %err, "Error in rate limiter");
            Admission::from(err)
        });

        if let Admission::Rejected {
            retry_after_secs,
            violations,
        } = &admission
        {
            warn!(
                ?actor,
                category = requested,
                violations,
                wait_secs = retry_after_secs,
                "Rate limit exceeded"
            );
            metrics::RATE_LIMIT_VIOLATIONS_TOTAL
                .with_label_values(&[resolved])
                .inc();
        }

        self.finish(resolved, admission)
    }

    /// Shorthand for a well-known category
    pub fn check(&self, actor: &A, category: Category) -> Admission {
        self.check_limit(Some(actor), category)
    }

    fn try_check(
        &self,
        actor: &A,
        category: &str,
        limit: &CategoryLimit,
    ) -> RateLimitResult<Admission> {
        let now = self.clock.now();
        let key = LimitKey::new(actor.clone(), category);
        let backoff = self.backoff;

        self.store.with_entry(&key, now, |state| {
            state.prune(now, limit.window());
            let count = state.count();

            if count >= u64::from(limit.limit) {
                let violations = state.add_violation();
                let retry_after_secs = wait_secs(state, limit, &backoff, now);
                return Admission::Rejected {
                    retry_after_secs,
                    violations,
                };
            }

            state.record(now, 1);
            let remaining = u64::from(limit.limit).saturating_sub(count + 1);
            Admission::Admitted {
                remaining: u32::try_from(remaining).unwrap_or(u32::MAX),
            }
        })
    }

    /// Remaining quota and suggested wait for `actor` in `category`
    ///
    /// Read-only apart from pruning expired records. Unknown categories and a
    /// missing actor yield `(0, 0)`.
    pub fn get_remaining_attempts(
        &self,
        actor: Option<&A>,
        category: impl AsRef<str>,
    ) -> RemainingAttempts {
        let category = category.as_ref();

        let (Some(actor), Some(limit)) = (actor, self.config.category(category)) else {
            debug!(category, "Remaining attempts requested for invalid input");
            return RemainingAttempts::none();
        };

        match self.try_remaining(actor, category, limit) {
            Ok(remaining) => remaining,
            Err(err) => {
                error!(?actor, category, error = %err, "Error getting rate limit info");
                RemainingAttempts::none()
            }
        }
    }

    fn try_remaining(
        &self,
        actor: &A,
        category: &str,
        limit: &CategoryLimit,
    ) -> RateLimitResult<RemainingAttempts> {
        let now = self.clock.now();
        let key = LimitKey::new(actor.clone(), category);
        let backoff = self.backoff;

        let existing = self.store.with_existing(&key, |state| {
            state.prune(now, limit.window());
            if state.is_empty() {
                return RemainingAttempts::new(limit.limit, 0);
            }
            let count = state.count();
            let remaining = u64::from(limit.limit).saturating_sub(count);
            RemainingAttempts::new(
                u32::try_from(remaining).unwrap_or(u32::MAX),
                wait_secs(state, limit, &backoff, now),
            )
        })?;

        Ok(existing.unwrap_or_else(|| RemainingAttempts::new(limit.limit, 0)))
    }

    /// Clear all attempts and violations of `actor` in every category
    ///
    /// Idempotent. Faults are logged, never returned.
    pub fn reset_limits(&self, actor: &A) {
        match self.store.remove_actor(actor) {
            Ok(0) => debug!(?actor, "No rate limit state to reset"),
            Ok(removed) => {
                info!(?actor, removed, "Reset rate limits");
                metrics::RATE_LIMIT_TRACKED_KEYS.sub(removed as i64);
            }
            Err(err) => error!(?actor, error = %err, "Error resetting rate limits"),
        }
    }

    /// Drop keys that have been idle for `idle_ttl_secs` with no live records
    pub fn sweep_idle(&self) -> usize {
        let now = self.clock.now();
        let config = Arc::clone(&self.config);
        let window_of = move |category: &str| {
            config
                .category(category)
                .or_else(|| config.default_category())
                .map(|limit| limit.window())
                .unwrap_or_else(chrono::Duration::zero)
        };

        match self.store.sweep_idle(now, self.config.idle_ttl(), window_of) {
            Ok(removed) => {
                if removed > 0 {
                    debug!(removed, "Swept idle rate limit keys");
                    metrics::RATE_LIMIT_SWEPT_KEYS_TOTAL.inc_by(removed as u64);
                    metrics::RATE_LIMIT_TRACKED_KEYS.sub(removed as i64);
                }
                removed
            }
            Err(err) => {
                error!(error = %err, "Error sweeping rate limit state");
                0
            }
        }
    }

    /// Run [`sweep_idle`](Self::sweep_idle) periodically on the tokio runtime
    ///
    /// A zero `sweep_interval_secs` is treated as one second.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let limiter = self.clone();
        if self.config.sweep_interval_secs == 0 {
            warn!("Sweep interval of 0s configured, sweeping every second instead");
        }
        let period = self.config.sweep_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                limiter.sweep_idle();
            }
        })
    }

    /// Number of tracked (actor, category) keys
    pub fn tracked_keys(&self) -> usize {
        self.store.len().unwrap_or_else(|err| {
            error!(error = %err, "Error counting rate limit state");
            0
        })
    }

    /// Categories with state for `actor`
    pub fn tracked_categories(&self, actor: &A) -> Vec<String> {
        self.store.categories_of(actor).unwrap_or_else(|err| {
            error!(?actor, error = %err, "Error listing rate limit state");
            Vec::new()
        })
    }

    /// Resolve a category tag, falling back to `message` for unknown tags
    fn resolve<'a>(&'a self, requested: &'a str) -> (&'a str, CategoryLimit) {
        if let Some(limit) = self.config.category(requested) {
            return (requested, *limit);
        }

        warn!(category = requested, "Unknown limit type, using message limits");
        let fallback = Category::Message.as_str();
        let limit = self
            .config
            .default_category()
            .copied()
            .unwrap_or(FALLBACK_LIMIT);
        (fallback, limit)
    }

    fn finish(&self, category: &str, admission: Admission) -> Admission {
        metrics::RATE_LIMIT_DECISIONS_TOTAL
            .with_label_values(&[category, admission.outcome()])
            .inc();
        admission
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &AttemptStore<A> {
        &self.store
    }
}

/// Larger of the window-expiry wait and the backoff wait
fn wait_secs(
    state: &KeyState,
    limit: &CategoryLimit,
    backoff: &BackoffPolicy,
    now: chrono::DateTime<chrono::Utc>,
) -> u64 {
    let window_wait = state
        .oldest()
        .map(|oldest| (oldest + limit.window() - now).num_seconds().max(0) as u64)
        .unwrap_or(0);
    let backoff_wait = backoff.wait_for(limit, state.violations());
    window_wait.max(backoff_wait)
}

impl From<RateLimitError> for Admission {
    fn from(err: RateLimitError) -> Self {
        Admission::FailOpen {
            reason: FailOpenReason::Internal(err.to_string()),
        }
    }
}
