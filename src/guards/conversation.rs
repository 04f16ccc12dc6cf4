//! Conversational front-end guard
//!
//! Checks `message` and `command` quotas before a chat interaction is handled,
//! and turns a rejection into the cooldown text sent back to the user.

use serde::Serialize;
use std::fmt::{self, Debug};
use std::hash::Hash;

use crate::rate_limit::{Category, RateLimiter};

/// Cooldown shown to a throttled user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CooldownNotice {
    pub category: Category,
    pub remaining: u32,
    pub wait_secs: u64,
    pub text: String,
}

impl CooldownNotice {
    fn new(category: Category, remaining: u32, wait_secs: u64) -> Self {
        let lead = match category {
            Category::Message => "Too many messages. Please wait",
            _ => "Too many requests. Please try again",
        };
        let text = match (category, wait_secs) {
            (_, 0) => format!("{}.", lead),
            (Category::Message, secs) => format!("{} {} seconds.", lead, secs),
            (_, secs) => format!("{} in {} seconds.", lead, secs),
        };

        Self {
            category,
            remaining,
            wait_secs,
            text,
        }
    }
}

impl fmt::Display for CooldownNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Guard for inbound chat messages and commands
#[derive(Debug, Clone)]
pub struct ConversationGuard<A = i64> {
    limiter: RateLimiter<A>,
}

impl<A> ConversationGuard<A>
where
    A: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    pub fn new(limiter: RateLimiter<A>) -> Self {
        Self { limiter }
    }

    /// Admit a free-form message or menu callback
    pub fn admit_message(&self, actor: Option<&A>) -> Result<(), CooldownNotice> {
        self.admit(actor, Category::Message)
    }

    /// Admit a bot command
    pub fn admit_command(&self, actor: Option<&A>) -> Result<(), CooldownNotice> {
        self.admit(actor, Category::Command)
    }

    fn admit(&self, actor: Option<&A>, category: Category) -> Result<(), CooldownNotice> {
        if self.limiter.check_limit(actor, category).is_allowed() {
            return Ok(());
        }

        let info = self.limiter.get_remaining_attempts(actor, category);
        Err(CooldownNotice::new(category, info.remaining, info.wait_secs))
    }
}
