//! Defines configuration as read from the environment.

use crate::error::RelayError;
use serde::Deserialize;

/// The relay is configured to start an execution of a single target
/// for every storage event it receives. The configuration must be
/// given as environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// The ARN of the workflow to start. Only Step Functions state
    /// machines are supported; any other ARN makes every handled
    /// storage event produce a bad request response.
    pub target_arn: String,

    /// Prefix for the generated correlation ids. An empty value means
    /// correlation ids are bare UUIDs.
    #[serde(default)]
    pub id: String,

    /// Enables debug logging when present, whatever its value.
    #[serde(default)]
    pub debug: Option<String>,
}

impl Settings {
    /// Read the settings from the process environment.
    pub fn from_env() -> Result<Self, RelayError> {
        Ok(envy::from_env()?)
    }

    /// Install the global log subscriber at the configured level.
    pub fn init_logging(&self) {
        tracing_subscriber::fmt()
            .with_max_level(self.log_level())
            .with_target(false)
            .without_time()
            .init();
    }

    /// Whether debug logging was requested.
    pub fn debug_enabled(&self) -> bool {
        self.debug.is_some()
    }

    /// The maximum log level to configure the subscriber with.
    pub fn log_level(&self) -> tracing::Level {
        if self.debug_enabled() {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
