use anyhow::{Context, Result};
use aws_lambda_events::event::sqs::SqsMessage;
use aws_sdk_sqs::{
    types::{DeleteMessageBatchRequestEntry, Message},
    Client,
};
use core::time::Duration;
use s3_sfn_relay::app::App;
use s3_sfn_relay::conf::Settings;
use s3_sfn_relay::dispatch::{aws_service_config, StepFunctions};
use s3_sfn_relay::notification::QUEUE_EVENT_SOURCE;
use s3_sfn_relay::relay::handle;
use std::env::var;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

/// The minimum time to wait between ticks, in milliseconds.
const BASE_LAPSE_TIME: u64 = 300;

/// The base of the exponential backoff sequence.
const BACKOFF_BASE: u64 = 2;

/// The maximum amount of milliseconds to sleep between ticks. Set to
/// the equivalent of 20 minutes.
const MAX_SLEEP: u64 = 1200000;

/// Present a received SQS message the way the Lambda SQS event source
/// would.
fn as_event_message(message: &Message, queue_arn: &Option<String>) -> SqsMessage {
    SqsMessage {
        message_id: message.message_id().map(String::from),
        receipt_handle: message.receipt_handle().map(String::from),
        body: message.body().map(String::from),
        md5_of_body: message.md5_of_body().map(String::from),
        event_source: Some(String::from(QUEUE_EVENT_SOURCE)),
        event_source_arn: queue_arn.clone(),
        ..Default::default()
    }
}

/// Wrapper structure that executes successive SQS consumption cycles:
/// receive messages, relay them as a batch, and finally delete them
/// if the batch succeeded.
struct SQSConsumer {
    app: App,
    dispatcher: StepFunctions,
    queue_url: String,
    queue_arn: Option<String>,
    visibility_timeout: i32,
    max_number_of_messages: i32,
    client: Client,
    backoff: u32,
}

impl SQSConsumer {
    /// Record a success and wait a little while.
    async fn pass(&mut self) {
        self.backoff = 0;
        sleep(Duration::from_millis(BASE_LAPSE_TIME)).await;
    }

    /// Record a failure and wait a while.
    async fn fail(&mut self) {
        sleep(Duration::from_millis(std::cmp::min(
            BASE_LAPSE_TIME.saturating_mul(BACKOFF_BASE.saturating_pow(self.backoff)),
            MAX_SLEEP,
        )))
        .await;
        self.backoff = self.backoff.saturating_add(1);
    }

    /// Perform a single pass of the SQS consumption cycle.
    #[instrument(skip(self))]
    pub async fn tick(&mut self) {
        let received = match self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .visibility_timeout(self.visibility_timeout)
            .max_number_of_messages(self.max_number_of_messages)
            .wait_time_seconds(20)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!("Error while consuming messages from SQS queue: {:?}", e);
                return self.fail().await;
            }
        };
        let messages = received.messages().unwrap_or_default();
        if messages.is_empty() {
            return self.pass().await;
        }

        let batch: Vec<SqsMessage> = messages
            .iter()
            .map(|message| as_event_message(message, &self.queue_arn))
            .collect();
        match handle(&self.app, &batch, &self.dispatcher).await {
            Ok(result) => info!(
                "Relayed batch with status {}: {}",
                result.status_code, result.message
            ),
            Err(e) => {
                warn!(
                    "Error encountered while relaying messages; SQS messages won't be deleted: {:?}",
                    e
                );
                return self.fail().await;
            }
        }

        info!("Deleting SQS messages");
        let deleted = match self
            .client
            .delete_message_batch()
            .queue_url(&self.queue_url)
            .set_entries(Some(
                messages
                    .iter()
                    .map(|message| {
                        DeleteMessageBatchRequestEntry::builder()
                            .set_id(message.message_id().map(String::from))
                            .set_receipt_handle(message.receipt_handle().map(String::from))
                            .build()
                    })
                    .collect(),
            ))
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!("Couldn't delete SQS messages: {:?}", e);
                return self.fail().await;
            }
        };
        let failed = deleted.failed().unwrap_or_default().len();
        if failed > 0 {
            warn!(
                "Couldn't delete some SQS messages: {:?} out of {:?} weren't deleted",
                failed,
                messages.len()
            );
        }
        self.pass().await;
    }
}

/// Consume an SQS queue of SNS-wrapped S3 notifications, starting a
/// state machine execution for each S3 event found. This is an
/// alternative to running the Lambda function.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let settings = Settings::from_env()?;
    settings.init_logging();
    let app = App::new(settings)?;

    let queue_url = var("SQS_QUEUE_URL").context("SQS_QUEUE_URL is required")?;
    let queue_arn = var("SQS_QUEUE_ARN").ok();
    let visibility_timeout = var("SQS_VISIBILITY_TIMEOUT")
        .unwrap_or(String::from("30"))
        .parse::<i32>()
        .context("SQS_VISIBILITY_TIMEOUT must be a number")?;
    let max_number_of_messages = var("SQS_MAX_NUMBER_OF_MESSAGES")
        .unwrap_or(String::from("10"))
        .parse::<i32>()
        .context("SQS_MAX_NUMBER_OF_MESSAGES must be a number")?;
    let config = aws_service_config().await;

    let mut consumer = SQSConsumer {
        app,
        dispatcher: StepFunctions::new(&config),
        queue_url,
        queue_arn,
        visibility_timeout,
        max_number_of_messages,
        client: Client::new(&config),
        backoff: 0,
    };

    // Listen for abort signals
    let (stop_processing, mut should_stop) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("CTRL-C");
            let _ = stop_processing.send(());
        }
    });

    // Continuously receive messages and relay them
    loop {
        tokio::select! {
            _ = consumer.tick() => (),
            _ = &mut should_stop => break
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presents_messages_as_queue_events() {
        let message = Message::builder()
            .message_id("059f36b4-87a3-44ab-83d2-661975830a7d")
            .receipt_handle("AQEBwJnKyrHigUMZj6rYigCgxlaS3SLy0a")
            .body("{\"Subject\":\"Amazon S3 Notification\"}")
            .build();
        let queue_arn = Some(String::from("arn:aws:sqs:eu-west-1:123456789012:ingest"));

        let event_message = as_event_message(&message, &queue_arn);

        assert_eq!(event_message.event_source.as_deref(), Some("aws:sqs"));
        assert_eq!(
            event_message.body.as_deref(),
            Some("{\"Subject\":\"Amazon S3 Notification\"}")
        );
        assert_eq!(
            event_message.receipt_handle.as_deref(),
            Some("AQEBwJnKyrHigUMZj6rYigCgxlaS3SLy0a")
        );
        assert_eq!(
            event_message.message_id.as_deref(),
            Some("059f36b4-87a3-44ab-83d2-661975830a7d")
        );
        assert_eq!(event_message.event_source_arn, queue_arn);
    }

    #[test]
    fn missing_body_stays_missing() {
        let event_message = as_event_message(&Message::builder().build(), &None);
        assert!(event_message.body.is_none());
        assert_eq!(event_message.event_source.as_deref(), Some("aws:sqs"));
    }
}
