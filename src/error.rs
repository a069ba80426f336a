//! Defines the failures that abort the handling of a batch.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// The environment couldn't be deserialized into settings.
    #[error("Failed to read settings from the environment: {0}")]
    Environment(#[from] envy::Error),

    /// The settings were read but can't be used.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// A queue message arrived without a body to parse.
    #[error("Queue message {message_id:?} has no body")]
    MissingBody { message_id: Option<String> },

    /// A JSON payload in the batch couldn't be parsed.
    #[error("Malformed {what}: {source}")]
    MalformedInput {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The workflow service refused or failed the execution start.
    #[error("Failed to start execution {name:?} of {target:?}")]
    Downstream {
        target: String,
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl RelayError {
    pub(crate) fn malformed(what: &'static str) -> impl FnOnce(serde_json::Error) -> Self {
        move |source| RelayError::MalformedInput { what, source }
    }
}
