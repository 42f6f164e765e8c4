//! Centralized error types shared by every crate in the workspace.
//!
//! Errors are classified as transient (transport trouble that may go away on
//! its own) or permanent, which lets callers decide how to report them.

use thiserror::Error;

/// Common error type for platform operations.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote service is unreachable or answered with a server error
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Timeout occurred
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// A required configuration value is absent
    #[error("Missing configuration: {0}")]
    MissingConfig(String),

    /// A configuration value is present but unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PlatformError {
    /// Check if this error is transient.
    ///
    /// Transient errors are transport failures: the remote side may answer
    /// differently next time.
    ///
    /// # Examples
    ///
    /// ```
    /// use cdct_common::PlatformError;
    ///
    /// let err = PlatformError::Timeout("broker".to_string());
    /// assert!(err.is_transient());
    ///
    /// let err = PlatformError::missing_config("PACT_BROKER_TOKEN");
    /// assert!(!err.is_transient());
    /// ```
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Unavailable(_) | Self::Timeout(_))
    }

    /// Check if this error comes from configuration rather than the network.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::MissingConfig(_) | Self::InvalidConfig(_))
    }

    /// Create an unavailable error with the given message.
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create a missing configuration error naming the absent setting.
    #[must_use]
    pub fn missing_config(name: impl Into<String>) -> Self {
        Self::MissingConfig(name.into())
    }

    /// Create an invalid configuration error with the given message.
    #[must_use]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
