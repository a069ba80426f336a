use anyhow::{Context, Result};
use aws_lambda_events::event::sqs::SqsEvent;
use s3_sfn_relay::app::App;
use s3_sfn_relay::conf::Settings;
use s3_sfn_relay::dispatch::{aws_service_config, StepFunctions};
use s3_sfn_relay::relay::handle;
use std::env::args;
use tokio::io::{stdin, AsyncReadExt};

/// Read the SQS event given as a file path, or from standard input if
/// no path was given.
async fn read_event() -> Result<String> {
    let mut raw = String::new();
    if let Some(path) = args().nth(1) {
        raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read event file {:?}", path))?;
    } else {
        stdin()
            .read_to_string(&mut raw)
            .await
            .context("Failed to read event from standard input")?;
    }
    Ok(raw)
}

/// Relay a single recorded SQS event, the same way the Lambda
/// function would, and print the result.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let settings = Settings::from_env()?;
    settings.init_logging();
    let app = App::new(settings)?;
    let dispatcher = StepFunctions::new(&aws_service_config().await);

    let event: SqsEvent =
        serde_json::from_str(&read_event().await?).context("Failed to parse the SQS event")?;
    let result = handle(&app, &event.records, &dispatcher)
        .await
        .with_context(|| format!("Failed to relay batch of {} messages", event.records.len()))?;

    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}
