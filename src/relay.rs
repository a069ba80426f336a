//! Relays batches of queued S3 notifications to workflow executions.

use crate::app::{App, Target};
use crate::dispatch::{Dispatcher, Execution};
use crate::error::RelayError;
use crate::notification::{Envelope, ObjectLocation, StorageEventRecord, QUEUE_EVENT_SOURCE};
use aws_lambda_events::event::sqs::SqsMessage;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, instrument};

pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;

/// Message answered to the S3 test event.
pub const TEST_EVENT_MESSAGE: &str =
    "This is a S3 test event created when an event notification is created.";

/// Body used when no list of objects is reported.
const PLACEHOLDER_BODY: &str = "{}";

/// The response of an invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayResult {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub message: String,
    pub body: String,
}

impl RelayResult {
    /// The acknowledgment of an S3 test event.
    pub fn test_event() -> Self {
        RelayResult {
            status_code: STATUS_OK,
            message: String::from(TEST_EVENT_MESSAGE),
            body: String::from(PLACEHOLDER_BODY),
        }
    }
}

/// The body accumulated while relaying a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Body {
    Locations(Vec<ObjectLocation>),
    Placeholder,
}

impl Body {
    fn push(&mut self, location: ObjectLocation) {
        if let Body::Locations(locations) = self {
            locations.push(location);
        }
    }

    fn render(&self) -> String {
        match self {
            Body::Locations(locations) => {
                serde_json::to_string(locations).unwrap_or_else(|_| String::from("[]"))
            }
            Body::Placeholder => String::from(PLACEHOLDER_BODY),
        }
    }
}

/// What to do after a queue message has been handled.
#[derive(Debug)]
enum Flow {
    /// Go on with the next message.
    Continue,
    /// Stop handling the batch and answer this.
    ShortCircuit(RelayResult),
}

/// The state of a single invocation.
struct Invocation<'a, D: ?Sized> {
    app: &'a App,
    dispatcher: &'a D,
    status_code: u16,
    body: Body,
    /// Ordinal of the next storage event. Starts at one and ends one
    /// past the amount of events handled, which is what gets reported.
    processed_events: usize,
}

impl<'a, D: Dispatcher + ?Sized> Invocation<'a, D> {
    fn new(app: &'a App, dispatcher: &'a D) -> Self {
        Invocation {
            app,
            dispatcher,
            status_code: STATUS_OK,
            body: Body::Locations(Vec::new()),
            processed_events: 1,
        }
    }

    async fn handle_message(&mut self, message: &SqsMessage) -> Result<Flow, RelayError> {
        if message.event_source.as_deref() != Some(QUEUE_EVENT_SOURCE) {
            return Ok(Flow::Continue);
        }
        let body = message.body.as_deref().ok_or_else(|| RelayError::MissingBody {
            message_id: message.message_id.clone(),
        })?;
        let envelope: Envelope =
            serde_json::from_str(body).map_err(RelayError::malformed("notification envelope"))?;
        info!("Received notification {:?}", envelope.subject);

        if !envelope.is_storage_notification() {
            return Ok(Flow::Continue);
        }
        let notification = envelope
            .notification()
            .map_err(RelayError::malformed("storage notification"))?;

        if notification.is_test_event() {
            return Ok(Flow::ShortCircuit(RelayResult::test_event()));
        }
        for raw in notification.records.iter().flatten() {
            let record = StorageEventRecord::from_raw(raw)
                .map_err(RelayError::malformed("storage event record"))?;
            if let Some(record) = record {
                self.handle_record(&record).await?;
            }
        }
        Ok(Flow::Continue)
    }

    async fn handle_record(&mut self, record: &StorageEventRecord) -> Result<(), RelayError> {
        info!(
            "### Processing event {} in this batch ###",
            self.processed_events
        );
        debug!("Storage record: {:?}", record);
        let location = ObjectLocation::from(record);
        info!("Bucket: {}", location.bucket);
        info!("ObjectKey: {}", location.key);
        info!("ObjectSize: {}", record.s3.object.size);
        self.body.push(location.clone());

        let correlation_id = self.app.correlation_id();
        info!("Correlation ID: {}", correlation_id);

        match &self.app.target {
            Target::StateMachine(arn) => {
                let execution = Execution {
                    state_machine_arn: arn.clone(),
                    name: correlation_id.clone(),
                    input: json!({
                        "trace_id": correlation_id,
                        "bucket": location.bucket,
                        "key": location.key,
                    }),
                };
                self.dispatcher.start_execution(&execution).await?;
            }
            Target::Unsupported(arn) => {
                error!(
                    "TARGET_ARN {:?} is invalid or not supported by this relay",
                    arn
                );
                self.status_code = STATUS_BAD_REQUEST;
                self.body = Body::Placeholder;
            }
        }

        info!(
            "### Finished processing event {} in this batch ###",
            self.processed_events
        );
        self.processed_events += 1;
        Ok(())
    }

    fn finish(self) -> RelayResult {
        RelayResult {
            status_code: self.status_code,
            message: format!("{} events successfully processed", self.processed_events),
            body: self.body.render(),
        }
    }
}

/// Handle a batch of queue messages: start one execution for every
/// storage event record found within, and summarize.
///
/// An S3 test event anywhere in the batch answers immediately, leaving
/// the rest of the batch untouched. Malformed payloads and failed
/// execution starts abort the whole batch.
#[instrument(skip_all, fields(messages = messages.len()))]
pub async fn handle<D>(
    app: &App,
    messages: &[SqsMessage],
    dispatcher: &D,
) -> Result<RelayResult, RelayError>
where
    D: Dispatcher + ?Sized,
{
    info!("Starting S3 notification relay");
    let mut invocation = Invocation::new(app, dispatcher);
    for message in messages {
        match invocation.handle_message(message).await? {
            Flow::Continue => (),
            Flow::ShortCircuit(result) => return Ok(result),
        }
    }
    Ok(invocation.finish())
}
