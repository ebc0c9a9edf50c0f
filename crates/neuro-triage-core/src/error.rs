//! Error taxonomy for the triage pipeline.
//!
//! A case that merely lacks joined data is *not* an error: readiness is
//! modeled as state, never as an `Error` variant. Nothing here is fatal to
//! the process; only an external shutdown signal terminates it.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the triage pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed inbound event payload. Dropped and logged; never affects
    /// unrelated cases.
    #[error("decode error on channel '{channel}': {message}")]
    Decode {
        /// Channel the payload arrived on
        channel: String,
        /// What failed to decode or validate
        message: String,
    },

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Semantic validation failure
    #[error("validation error: {0}")]
    Validation(String),

    /// An external prediction/explanation call threw or timed out.
    /// Absorbed by the breaker and triggers the fallback path.
    #[error("dependency '{name}' failed: {message}")]
    Dependency {
        /// Name of the protected dependency
        name: String,
        /// Failure detail
        message: String,
    },

    /// Fail-fast signal distinguishing "known down" from "just failed".
    /// Also triggers the fallback path, skipping the call entirely.
    #[error("circuit breaker '{0}' is open")]
    BreakerOpen(String),

    /// An internal channel closed unexpectedly
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O failure
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a decode error
    pub fn decode(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a dependency failure
    pub fn dependency(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Dependency {
            name: name.into(),
            message: message.into(),
        }
    }

    /// True when this error is the breaker's fail-fast signal
    pub fn is_breaker_open(&self) -> bool {
        matches!(self, Self::BreakerOpen(_))
    }

    /// True when this error should route evaluation onto the fallback path
    pub fn is_fallback_trigger(&self) -> bool {
        matches!(self, Self::BreakerOpen(_) | Self::Dependency { .. })
    }
}
