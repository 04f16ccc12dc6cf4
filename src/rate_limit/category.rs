//! Action Categories
//!
//! Well-known action classes that carry their own quota. Callers may still pass
//! arbitrary string tags; unknown tags are resolved by the limiter.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::RateLimitError;

/// Well-known rate-limited action classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Free-form chat messages and menu callbacks
    Message,
    /// Bot commands
    Command,
    /// Authentication and other sensitive actions
    Auth,
    /// Payment-session creation
    Payment,
}

impl Category {
    /// All well-known categories
    pub const ALL: [Category; 4] = [
        Category::Message,
        Category::Command,
        Category::Auth,
        Category::Payment,
    ];

    /// The string tag used as the configuration key
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Message => "message",
            Category::Command => "command",
            Category::Auth => "auth",
            Category::Payment => "payment",
        }
    }
}

impl AsRef<str> for Category {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = RateLimitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "message" => Ok(Category::Message),
            "command" => Ok(Category::Command),
            "auth" => Ok(Category::Auth),
            "payment" => Ok(Category::Payment),
            _ => Err(RateLimitError::UnknownCategory(s.to_string())),
        }
    }
}
