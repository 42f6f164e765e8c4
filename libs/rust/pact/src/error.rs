//! Contract testing error types.
//!
//! Structural mismatches are not errors: they are collected as values in a
//! verification outcome. The variants here are the failures that stop an
//! operation, classified so the CLI can tell them apart.

use cdct_common::PlatformError;
use std::path::PathBuf;
use thiserror::Error;

/// Contract testing errors.
#[derive(Error, Debug)]
pub enum PactError {
    /// Required identity or credential is missing or unusable
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Contract violates a model invariant
    #[error("Invalid contract: {0}")]
    InvalidContract(String),

    /// Live provider could not be reached or timed out
    #[error("Provider unreachable: {0}")]
    ProviderUnreachable(String),

    /// Provider state precondition could not be established
    #[error("State setup failed for '{state}': {reason}")]
    StateSetupFailed {
        /// The provider state that was requested
        state: String,
        /// Why it failed
        reason: String,
    },

    /// Broker answered with a non-success status
    #[error("Broker request failed with status {status}: {body}")]
    Broker {
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// Broker could not be reached
    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    /// Reading or writing a contract document failed
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Platform error
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Result type for contract testing operations.
pub type PactResult<T> = Result<T, PactError>;

/// Coarse failure class, used to keep failures distinguishable in logs and
/// exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing or invalid configuration; nothing was attempted
    Configuration,
    /// Network or remote-service failure
    Transport,
    /// A contract document is unusable
    Contract,
    /// Local I/O failure
    Internal,
}

impl PactError {
    /// Classify the error.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) | Self::InvalidUrl(_) => ErrorCategory::Configuration,
            Self::Platform(err) if err.is_configuration() => ErrorCategory::Configuration,
            Self::ProviderUnreachable(_)
            | Self::StateSetupFailed { .. }
            | Self::Broker { .. }
            | Self::BrokerUnavailable(_)
            | Self::Platform(_) => ErrorCategory::Transport,
            Self::InvalidContract(_) | Self::Serialization(_) => ErrorCategory::Contract,
            Self::Io { .. } => ErrorCategory::Internal,
        }
    }

    /// Create a configuration error.
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an invalid contract error.
    #[must_use]
    pub fn invalid_contract(msg: impl Into<String>) -> Self {
        Self::InvalidContract(msg.into())
    }

    /// Create a provider unreachable error.
    #[must_use]
    pub fn provider_unreachable(msg: impl Into<String>) -> Self {
        Self::ProviderUnreachable(msg.into())
    }

    /// Create a state setup error.
    #[must_use]
    pub fn state_setup(state: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StateSetupFailed {
            state: state.into(),
            reason: reason.into(),
        }
    }

    /// Create an I/O error for `path`.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
