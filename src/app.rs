//! Defines the read-only application state, derived once from the
//! settings and handed to every invocation.

use crate::conf::Settings;
use crate::correlation::correlation_id;
use crate::error::RelayError;
use tracing::warn;

/// Text found in the ARNs of Step Functions state machines.
pub const STATE_MACHINE_MARKER: &str = "stateMachine";

/// The kind of workflow the relay was pointed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A state machine ARN; executions can be started on it.
    StateMachine(String),
    /// Anything else. Storage events are answered with a bad request.
    Unsupported(String),
}

impl Target {
    /// Classify a target ARN.
    pub fn classify(arn: &str) -> Self {
        if arn.contains(STATE_MACHINE_MARKER) {
            Target::StateMachine(String::from(arn))
        } else {
            Target::Unsupported(String::from(arn))
        }
    }

    pub fn arn(&self) -> &str {
        match self {
            Target::StateMachine(arn) | Target::Unsupported(arn) => arn,
        }
    }
}

/// An App is an initialized application state, derived from
/// settings.
#[derive(Debug, Clone)]
pub struct App {
    /// The original settings.
    pub settings: Settings,

    /// The classified target.
    pub target: Target,
}

impl App {
    /// Initialize an App instance given a settings struct. Consumes
    /// the settings struct.
    pub fn new(settings: Settings) -> Result<Self, RelayError> {
        if settings.target_arn.trim().is_empty() {
            return Err(RelayError::Configuration(String::from(
                "TARGET_ARN must not be empty",
            )));
        }
        let target = Target::classify(&settings.target_arn);
        if let Target::Unsupported(arn) = &target {
            warn!(
                "TARGET_ARN {:?} is not a state machine; storage events will be rejected",
                arn
            );
        }
        Ok(App { settings, target })
    }

    /// Generate a correlation id using the configured prefix.
    pub fn correlation_id(&self) -> String {
        correlation_id(&self.settings.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(target_arn: &str) -> Settings {
        Settings {
            target_arn: String::from(target_arn),
            id: String::new(),
            debug: None,
        }
    }

    #[test]
    fn classifies_state_machines() {
        let app = App::new(settings(
            "arn:aws:states:eu-west-1:123456789012:stateMachine:ingest",
        ))
        .expect("app should initialize");
        assert!(matches!(app.target, Target::StateMachine(_)));
    }

    #[test]
    fn classifies_other_targets_as_unsupported() {
        let app = App::new(settings(
            "arn:aws:lambda:eu-west-1:123456789012:function:ingest",
        ))
        .expect("app should initialize");
        assert_eq!(
            app.target,
            Target::Unsupported(String::from(
                "arn:aws:lambda:eu-west-1:123456789012:function:ingest"
            ))
        );
    }

    #[test]
    fn rejects_empty_target() {
        assert!(matches!(
            App::new(settings("  ")),
            Err(RelayError::Configuration(_))
        ));
    }
}
