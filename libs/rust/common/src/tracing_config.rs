//! Tracing subscriber initialisation.
//!
//! Logs always go to stderr so that reports printed on stdout can be piped.

use crate::error::PlatformError;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Filter directive such as `info` or `cdct_pact=debug`; `RUST_LOG` wins when set
    pub log_level: String,
    /// Emit one JSON object per event
    pub json_output: bool,
    /// Print the module path of each event
    pub show_target: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_output: false,
            show_target: false,
        }
    }
}

impl TracingConfig {
    /// Set the filter directive.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Enable JSON output.
    #[must_use]
    pub const fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }

    /// Print event targets.
    #[must_use]
    pub const fn with_targets(mut self) -> Self {
        self.show_target = true;
        self
    }

    fn filter(&self) -> Result<EnvFilter, PlatformError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(self.log_level.trim()).map_err(|e| {
            PlatformError::invalid_config(format!("log level '{}': {e}", self.log_level))
        })
    }
}

/// Install the global subscriber.
///
/// A subscriber that is already installed is left in place.
///
/// # Errors
///
/// Returns [`PlatformError::InvalidConfig`] when the log level is not a valid
/// filter directive.
pub fn init_tracing(config: &TracingConfig) -> Result<(), PlatformError> {
    let filter = config.filter()?;
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.show_target);

    let installed = if config.json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init()
    };
    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
    Ok(())
}
