//! Spam heuristics.
//!
//! Each rule is a named predicate over the sanitized query. Rules are plain
//! data so operators can reorder them or add regex patterns in the config
//! file without touching the validator.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Minimum run length of one character that counts as spam.
pub const DEFAULT_REPEAT_RUN: usize = 5;

/// Minimum length of an all-caps query that counts as shouting.
pub const DEFAULT_SHOUTING_LENGTH: usize = 5;

/// A single spam heuristic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpamRule {
    /// Any character repeated `min_run` or more times in a row.
    RepeatedChar { min_run: usize },
    /// Only uppercase letters, whitespace and symbols, at least `min_length` long.
    Shouting { min_length: usize },
    /// Nothing but punctuation and symbols.
    PunctuationOnly,
    /// Operator-supplied regular expression.
    Pattern { name: String, regex: SpamPattern },
}

impl SpamRule {
    /// The canonical rule set, in evaluation order.
    pub fn defaults() -> Vec<SpamRule> {
        vec![
            SpamRule::RepeatedChar {
                min_run: DEFAULT_REPEAT_RUN,
            },
            SpamRule::Shouting {
                min_length: DEFAULT_SHOUTING_LENGTH,
            },
            SpamRule::PunctuationOnly,
        ]
    }

    /// Build a [`SpamRule::Pattern`], compiling the expression.
    pub fn pattern(name: &str, regex: &str) -> Result<Self, regex::Error> {
        Ok(SpamRule::Pattern {
            name: name.to_string(),
            regex: SpamPattern::new(regex)?,
        })
    }

    /// Rule name for logs.
    pub fn name(&self) -> &str {
        match self {
            SpamRule::RepeatedChar { .. } => "repeated_char",
            SpamRule::Shouting { .. } => "shouting",
            SpamRule::PunctuationOnly => "punctuation_only",
            SpamRule::Pattern { name, .. } => name.as_str(),
        }
    }

    /// Returns `true` when the candidate looks like spam under this rule.
    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            SpamRule::RepeatedChar { min_run } => has_repeated_run(candidate, *min_run),
            SpamRule::Shouting { min_length } => is_shouting(candidate, *min_length),
            SpamRule::PunctuationOnly => is_punctuation_only(candidate),
            SpamRule::Pattern { regex, .. } => regex.is_match(candidate),
        }
    }
}

fn is_symbol(c: char) -> bool {
    !c.is_alphanumeric() && !c.is_whitespace() && !c.is_control()
}

fn has_repeated_run(candidate: &str, min_run: usize) -> bool {
    let mut prev = None;
    let mut run = 0usize;
    for c in candidate.chars() {
        if Some(c) == prev {
            run += 1;
        } else {
            prev = Some(c);
            run = 1;
        }
        if run >= min_run {
            return true;
        }
    }
    false
}

fn is_shouting(candidate: &str, min_length: usize) -> bool {
    if candidate.chars().count() < min_length {
        return false;
    }
    let mut saw_letter = false;
    for c in candidate.chars() {
        if c.is_alphabetic() {
            if !c.is_uppercase() {
                return false;
            }
            saw_letter = true;
        } else if !(c.is_whitespace() || is_symbol(c)) {
            return false;
        }
    }
    saw_letter
}

fn is_punctuation_only(candidate: &str) -> bool {
    let mut saw_symbol = false;
    for c in candidate.chars() {
        if is_symbol(c) {
            saw_symbol = true;
        } else if !c.is_whitespace() {
            return false;
        }
    }
    saw_symbol
}

// ============================================================================
// SpamPattern
// ============================================================================

/// A compiled regex that (de)serializes as its source string.
///
/// Compilation happens when the config is deserialized, so a bad pattern
/// fails at startup instead of on the first query.
#[derive(Debug, Clone)]
pub struct SpamPattern(Regex);

impl SpamPattern {
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Regex::new(source).map(SpamPattern)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.0.is_match(haystack)
    }
}

impl PartialEq for SpamPattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for SpamPattern {}

impl Serialize for SpamPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SpamPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        SpamPattern::new(&source).map_err(serde::de::Error::custom)
    }
}
