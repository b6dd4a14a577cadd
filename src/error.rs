//! Error types for PsyBot
//!
//! Validation and rate limiting never fail: they report through their return
//! values. Everything that touches the outside world (config files, the
//! completion API, Telegram) funnels into [`BotError`].

use std::fmt;
use thiserror::Error;

// ============================================================================
// Provider Error Classification
// ============================================================================

/// Structured classification of a failed completion request.
///
/// The three families mirror what a user can act on: the provider answered
/// with an error, the provider never answered, or something broke locally.
#[derive(Debug)]
pub enum ProviderError {
    /// The provider returned a non-success HTTP status.
    Api { status: u16, message: String },
    /// No response was received (connect failure, DNS, timeout).
    NoResponse(String),
    /// A 2xx response arrived but carried no usable completion.
    InvalidResponse(String),
    /// Failure before the request left the process.
    Local(String),
}

/// User-facing error category for a failed query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The completion service reported a problem.
    Api,
    /// The completion service could not be reached.
    Network,
    /// Anything else.
    Unknown,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Api { status, message } => {
                write!(f, "API error ({}): {}", status, message)
            }
            ProviderError::NoResponse(msg) => write!(f, "No response: {}", msg),
            ProviderError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            ProviderError::Local(msg) => write!(f, "Local error: {}", msg),
        }
    }
}

impl ProviderError {
    /// Map the failure onto the message family shown to the user.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ProviderError::Api { .. } | ProviderError::InvalidResponse(_) => ErrorCategory::Api,
            ProviderError::NoResponse(_) => ErrorCategory::Network,
            ProviderError::Local(_) => ErrorCategory::Unknown,
        }
    }

    /// Returns the HTTP status code associated with this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            ProviderError::Api {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_timeout() || err.is_connect() || err.is_request() {
            ProviderError::NoResponse(err.to_string())
        } else if err.is_decode() || err.is_body() {
            ProviderError::InvalidResponse(err.to_string())
        } else {
            ProviderError::Local(err.to_string())
        }
    }
}

impl From<ProviderError> for BotError {
    fn from(err: ProviderError) -> Self {
        BotError::Provider(err)
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for PsyBot operations.
#[derive(Error, Debug)]
pub enum BotError {
    /// Configuration-related errors (invalid values, missing token, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Completion provider failures.
    #[error("Provider error: {0}")]
    Provider(ProviderError),

    /// Telegram transport errors.
    #[error("Channel error: {0}")]
    Channel(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client construction or transport errors outside a completion call
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A specialized `Result` type for PsyBot operations.
pub type Result<T> = std::result::Result<T, BotError>;
