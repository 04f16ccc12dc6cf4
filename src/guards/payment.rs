//! Payment guard
//!
//! Runs before a payment session is created. The `payment` quota is checked
//! first; admitted attempts then pass through a simple fixed-window fraud
//! counter that is independent of the rate limiter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tracing::{error, warn};

use super::GuardError;
use crate::metrics;
use crate::rate_limit::config::span;
use crate::rate_limit::{Admission, Category, Clock, RateLimiter, SystemClock};

pub const DEFAULT_FRAUD_THRESHOLD: u32 = 5;
pub const DEFAULT_FRAUD_RESET_HOURS: u64 = 24;

pub const PAYMENT_THROTTLED_MESSAGE: &str =
    "Too many payment attempts. Please try again later.";

/// Settings for the suspicious-activity counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuspiciousActivityConfig {
    /// Attempts per period before activity is flagged
    pub threshold: u32,

    /// Length of the counting period in hours
    pub reset_hours: u64,
}

impl Default for SuspiciousActivityConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_FRAUD_THRESHOLD,
            reset_hours: DEFAULT_FRAUD_RESET_HOURS,
        }
    }
}

impl SuspiciousActivityConfig {
    pub fn reset_period(&self) -> chrono::Duration {
        span(self.reset_hours.saturating_mul(3600))
    }
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u32,
    period_started: DateTime<Utc>,
}

/// Fixed-window payment attempt counter per actor
#[derive(Debug, Clone)]
pub struct SuspiciousActivityTracker<A = i64> {
    config: SuspiciousActivityConfig,
    counters: Arc<Mutex<HashMap<A, Counter>>>,
    clock: Arc<dyn Clock>,
}

impl<A> SuspiciousActivityTracker<A>
where
    A: Eq + Hash + Clone + Debug,
{
    pub fn new(config: SuspiciousActivityConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: SuspiciousActivityConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            counters: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.config.threshold
    }

    /// Count an attempt; returns whether the actor now looks suspicious
    ///
    /// The first `threshold` attempts in a period are fine, every later one is
    /// flagged. A counter whose period has elapsed starts over. Faults are
    /// logged and reported as not suspicious.
    pub fn record(&self, actor: &A) -> bool {
        let now = self.clock.now();
        let Ok(mut counters) = self.counters.lock() else {
            error!(?actor, "Suspicious activity counter lock poisoned");
            return false;
        };

        let counter = counters.entry(actor.clone()).or_insert(Counter {
            count: 0,
            period_started: now,
        });
        if now - counter.period_started >= self.config.reset_period() {
            *counter = Counter {
                count: 0,
                period_started: now,
            };
        }
        counter.count = counter.count.saturating_add(1);

        let suspicious = counter.count > self.config.threshold;
        if suspicious {
            warn!(?actor, attempts = counter.count, "Suspicious payment activity");
            metrics::SUSPICIOUS_PAYMENT_ACTIVITY_TOTAL.inc();
        }
        suspicious
    }

    /// Attempts counted for the actor in the current period
    pub fn attempts(&self, actor: &A) -> u32 {
        let now = self.clock.now();
        self.counters
            .lock()
            .ok()
            .and_then(|counters| {
                counters
                    .get(actor)
                    .filter(|c| now - c.period_started < self.config.reset_period())
                    .map(|c| c.count)
            })
            .unwrap_or(0)
    }

    /// Forget the actor's counter
    pub fn reset(&self, actor: &A) {
        match self.counters.lock() {
            Ok(mut counters) => {
                counters.remove(actor);
            }
            Err(_) => error!(?actor, "Suspicious activity counter lock poisoned"),
        }
    }
}

/// Guard run before creating a payment session
#[derive(Debug, Clone)]
pub struct PaymentGuard<A = i64> {
    limiter: RateLimiter<A>,
    tracker: SuspiciousActivityTracker<A>,
}

impl<A> PaymentGuard<A>
where
    A: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    pub fn new(limiter: RateLimiter<A>, tracker: SuspiciousActivityTracker<A>) -> Self {
        Self { limiter, tracker }
    }

    /// Decide whether `actor` may start a payment
    ///
    /// A missing actor passes the rate limit by policy but is not counted by
    /// the fraud tracker.
    pub fn begin_payment(&self, actor: Option<&A>) -> Result<(), GuardError> {
        if let Admission::Rejected {
            retry_after_secs, ..
        } = self.limiter.check_limit(actor, Category::Payment)
        {
            return Err(GuardError::Throttled {
                category: Category::Payment.to_string(),
                wait_secs: retry_after_secs,
                message: PAYMENT_THROTTLED_MESSAGE.to_string(),
            });
        }

        if let Some(actor) = actor {
            if self.tracker.record(actor) {
                return Err(GuardError::SuspiciousActivity {
                    attempts: self.tracker.attempts(actor),
                });
            }
        }

        Ok(())
    }

    pub fn tracker(&self) -> &SuspiciousActivityTracker<A> {
        &self.tracker
    }
}
