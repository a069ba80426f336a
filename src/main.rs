use anyhow::{anyhow, Context, Result};
use aws_lambda_events::event::sqs::SqsEvent;
use lambda_runtime::{run, service_fn, LambdaEvent};
use s3_sfn_relay::app::App;
use s3_sfn_relay::conf::Settings;
use s3_sfn_relay::dispatch::{aws_service_config, StepFunctions};
use s3_sfn_relay::relay::{handle, RelayResult};
use tracing::debug;

/// Relay every S3 notification in the batch to the target state
/// machine.
async fn function_handler(
    app: &App,
    dispatcher: &StepFunctions,
    event: LambdaEvent<SqsEvent>,
) -> Result<RelayResult> {
    debug!("Invocation {:?}: {:?}", event.context.request_id, event.payload);
    handle(app, &event.payload.records, dispatcher)
        .await
        .with_context(|| {
            format!(
                "Failed to relay batch of {} messages",
                event.payload.records.len()
            )
        })
}

/// Run an AWS Lambda function that listens to SQS events containing
/// SNS-wrapped S3 notifications, and that starts a state machine
/// execution for each S3 event found.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let settings = Settings::from_env()?;
    settings.init_logging();
    let app = App::new(settings)?;
    let dispatcher = StepFunctions::new(&aws_service_config().await);

    run(service_fn(|event: LambdaEvent<SqsEvent>| {
        function_handler(&app, &dispatcher, event)
    }))
    .await
    .map_err(|e| anyhow!("{:?}", e))
}
