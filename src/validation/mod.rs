//! Query validation.
//!
//! Every user question passes through [`validate`] before it can consume a
//! rate-limit slot or reach the completion provider. The function is pure:
//! the sanitized query is returned on acceptance and every failure is a
//! [`RejectReason`], never an error.
//!
//! ```
//! use psybot::validation::{validate, RejectReason, ValidationConfig, ValidationResult};
//!
//! let config = ValidationConfig::default();
//! assert_eq!(
//!     validate("  Why   do I\n\nprocrastinate? ", &config),
//!     ValidationResult::Accepted {
//!         sanitized_query: "Why do I procrastinate?".to_string()
//!     }
//! );
//! assert_eq!(
//!     validate("   \n  ", &config),
//!     ValidationResult::Rejected { reason: RejectReason::Empty }
//! );
//! ```

mod rules;

pub use rules::{SpamPattern, SpamRule};

use serde::{Deserialize, Serialize};

/// Default minimum query length, in characters.
pub const DEFAULT_MIN_LENGTH: usize = 3;

/// Default maximum query length, in characters.
pub const DEFAULT_MAX_LENGTH: usize = 500;

/// Length bounds and spam rules applied to every query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Minimum sanitized length (inclusive).
    pub min_length: usize,
    /// Maximum sanitized length (inclusive).
    pub max_length: usize,
    /// Spam rules, evaluated in order; the first match rejects.
    pub spam_rules: Vec<SpamRule>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_length: DEFAULT_MIN_LENGTH,
            max_length: DEFAULT_MAX_LENGTH,
            spam_rules: SpamRule::defaults(),
        }
    }
}

/// Why a query was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// Nothing left after whitespace normalization.
    Empty,
    /// Shorter than `min_length`.
    TooShort,
    /// Longer than `max_length`.
    TooLong,
    /// Matched one of the spam rules.
    SpamLike,
}

impl RejectReason {
    /// Stable identifier used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Empty => "empty",
            RejectReason::TooShort => "too_short",
            RejectReason::TooLong => "too_long",
            RejectReason::SpamLike => "spam_like",
        }
    }
}

/// Outcome of [`validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Accepted { sanitized_query: String },
    Rejected { reason: RejectReason },
}

impl ValidationResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationResult::Accepted { .. })
    }
}

/// Collapse every whitespace run into a single ASCII space and trim the ends.
pub fn sanitize(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Validate and sanitize a raw user query.
///
/// Checks run in a fixed order: empty, too short, too long, then the spam
/// rules in configured order. Lengths count characters, not bytes.
pub fn validate(raw: &str, config: &ValidationConfig) -> ValidationResult {
    let candidate = sanitize(raw);
    let len = candidate.chars().count();

    let reason = if len == 0 {
        Some(RejectReason::Empty)
    } else if len < config.min_length {
        Some(RejectReason::TooShort)
    } else if len > config.max_length {
        Some(RejectReason::TooLong)
    } else if first_matching_rule(&candidate, &config.spam_rules).is_some() {
        Some(RejectReason::SpamLike)
    } else {
        None
    };

    match reason {
        Some(reason) => ValidationResult::Rejected { reason },
        None => ValidationResult::Accepted {
            sanitized_query: candidate,
        },
    }
}

/// Return the first rule that flags `candidate`, if any.
pub fn first_matching_rule<'a>(candidate: &str, rules: &'a [SpamRule]) -> Option<&'a SpamRule> {
    rules.iter().find(|rule| rule.matches(candidate))
}
