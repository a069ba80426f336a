//! Defines how workflow executions are started, and the AWS
//! configuration used by the clients that start them.

use crate::error::RelayError;
use async_trait::async_trait;
use aws_config::SdkConfig;
use serde_json::Value;
use std::env;
use tracing::debug;

/// A single workflow execution to be started.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub state_machine_arn: String,

    /// The execution name; unique per state machine.
    pub name: String,

    /// The execution input, sent JSON-encoded.
    pub input: Value,
}

/// Something able to start workflow executions.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn start_execution(&self, execution: &Execution) -> Result<(), RelayError>;
}

/// Starts executions of Step Functions state machines.
pub struct StepFunctions {
    client: aws_sdk_sfn::Client,
}

impl StepFunctions {
    pub fn new(config: &SdkConfig) -> Self {
        StepFunctions {
            client: aws_sdk_sfn::Client::new(config),
        }
    }
}

#[async_trait]
impl Dispatcher for StepFunctions {
    async fn start_execution(&self, execution: &Execution) -> Result<(), RelayError> {
        let output = self
            .client
            .start_execution()
            .state_machine_arn(&execution.state_machine_arn)
            .name(&execution.name)
            .input(execution.input.to_string())
            .send()
            .await
            .map_err(|e| RelayError::Downstream {
                target: execution.state_machine_arn.clone(),
                name: execution.name.clone(),
                source: Box::new(e),
            })?;
        debug!("Started execution {:?}", output.execution_arn());
        Ok(())
    }
}

/// Prepend a scheme to an endpoint URL lacking one.
fn normalize_endpoint(endpoint_url: String) -> String {
    if endpoint_url.starts_with("http://") || endpoint_url.starts_with("https://") {
        endpoint_url
    } else {
        format!("https://{}", endpoint_url)
    }
}

/// Load the shared AWS configuration, honouring an
/// `AWS_ENDPOINT_URL` override.
pub async fn aws_service_config() -> SdkConfig {
    if let Ok(endpoint_url) = env::var("AWS_ENDPOINT_URL") {
        aws_config::from_env()
            .endpoint_url(normalize_endpoint(endpoint_url))
            .region("us-east-1") // should be OK since the endpoint was overridden
            .load()
            .await
    } else {
        aws_config::from_env().load().await
    }
}
