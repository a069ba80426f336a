//! Defines the payloads nested inside each queue message: the SNS
//! envelope, the S3 notification it carries, and the storage event
//! records within.

use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event source tag of messages delivered by SQS.
pub const QUEUE_EVENT_SOURCE: &str = "aws:sqs";

/// Event source tag of S3 event records.
pub const STORAGE_EVENT_SOURCE: &str = "aws:s3";

/// Text found in the subject of envelopes carrying S3 notifications.
pub const STORAGE_SUBJECT_MARKER: &str = "Amazon S3 Notification";

/// Value of the `Event` field in the notification S3 sends when a
/// subscription is first configured.
pub const TEST_EVENT: &str = "s3:TestEvent";

/// The SNS notification wrapping an S3 notification, as found in the
/// body of a queue message.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "Subject")]
    pub subject: String,

    /// The JSON-encoded S3 notification. Only read when the subject
    /// marks the envelope as an S3 notification.
    #[serde(rename = "Message", default)]
    pub message: Option<String>,
}

impl Envelope {
    /// Whether the envelope claims to carry an S3 notification.
    pub fn is_storage_notification(&self) -> bool {
        self.subject.contains(STORAGE_SUBJECT_MARKER)
    }

    /// Parse the wrapped S3 notification.
    pub fn notification(&self) -> Result<StorageNotification, serde_json::Error> {
        let message = self
            .message
            .as_deref()
            .ok_or_else(|| serde_json::Error::missing_field("Message"))?;
        serde_json::from_str(message)
    }
}

/// An S3 notification. It's either the test event, or a batch of
/// records.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageNotification {
    #[serde(rename = "Event", default)]
    pub event: Option<String>,

    /// The raw records. They're parsed one at a time, so records from
    /// other sources don't need to look like S3 records.
    #[serde(rename = "Records", default)]
    pub records: Option<Vec<Value>>,
}

impl StorageNotification {
    pub fn is_test_event(&self) -> bool {
        self.event.as_deref() == Some(TEST_EVENT)
    }
}

/// The part of a record read before deciding whether to parse it.
#[derive(Deserialize)]
struct RecordSource {
    #[serde(rename = "eventSource")]
    event_source: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageEventRecord {
    #[serde(rename = "eventSource")]
    pub event_source: String,
    pub s3: StorageEntity,
}

impl StorageEventRecord {
    /// Parse a raw record if it was emitted by S3. Records from other
    /// sources yield `None`, whatever else they contain.
    pub fn from_raw(raw: &Value) -> Result<Option<Self>, serde_json::Error> {
        let source = RecordSource::deserialize(raw)?;
        if source.event_source != STORAGE_EVENT_SOURCE {
            return Ok(None);
        }
        StorageEventRecord::deserialize(raw).map(Some)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageEntity {
    pub bucket: StorageBucket,
    pub object: StorageObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageBucket {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageObject {
    pub key: String,
    pub size: u64,
}

/// The location of an object that was relayed, as listed in the
/// response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl From<&StorageEventRecord> for ObjectLocation {
    fn from(record: &StorageEventRecord) -> Self {
        ObjectLocation {
            bucket: record.s3.bucket.name.clone(),
            key: record.s3.object.key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_test_event() {
        let notification: StorageNotification = serde_json::from_value(json!({
            "Service": "Amazon S3",
            "Event": "s3:TestEvent",
            "Time": "2020-05-04T12:00:00.000Z",
            "Bucket": "bucket",
        }))
        .expect("notification should parse");
        assert!(notification.is_test_event());
        assert!(notification.records.is_none());
    }

    #[test]
    fn parses_records() {
        let notification: StorageNotification = serde_json::from_value(json!({
            "Records": [{
                "eventVersion": "2.1",
                "eventSource": "aws:s3",
                "eventName": "ObjectCreated:Put",
                "s3": {
                    "bucket": {"name": "ingest", "arn": "arn:aws:s3:::ingest"},
                    "object": {"key": "incoming/a.csv", "size": 1024, "eTag": "abc"}
                }
            }]
        }))
        .expect("notification should parse");
        assert!(!notification.is_test_event());
        let records = notification.records.expect("records should be present");
        assert_eq!(records.len(), 1);
        let record = StorageEventRecord::from_raw(&records[0])
            .expect("record should parse")
            .expect("record should come from S3");
        assert_eq!(record.s3.object.size, 1024);
        assert_eq!(
            ObjectLocation::from(&record),
            ObjectLocation {
                bucket: String::from("ingest"),
                key: String::from("incoming/a.csv"),
            }
        );
    }

    #[test]
    fn other_events_are_not_test_events() {
        let notification: StorageNotification =
            serde_json::from_value(json!({"Event": "s3:Other"})).expect("notification should parse");
        assert!(!notification.is_test_event());
    }

    #[test]
    fn skips_records_from_other_sources_unread() {
        let record = StorageEventRecord::from_raw(&json!({"eventSource": "aws:other"}))
            .expect("foreign record should not fail");
        assert!(record.is_none());
    }

    #[test]
    fn storage_records_require_location_and_size() {
        assert!(StorageEventRecord::from_raw(&json!({"eventSource": "aws:s3"})).is_err());
        assert!(StorageEventRecord::from_raw(&json!({
            "eventSource": "aws:s3",
            "s3": {"bucket": {"name": "ingest"}, "object": {"key": "a.csv"}}
        }))
        .is_err());
        assert!(StorageEventRecord::from_raw(&json!({"s3": {}})).is_err());
    }

    #[test]
    fn message_is_only_required_when_read() {
        let envelope: Envelope = serde_json::from_value(json!({"Subject": "Other traffic"}))
            .expect("envelope should parse");
        assert!(!envelope.is_storage_notification());
        assert!(envelope.message.is_none());

        let envelope: Envelope =
            serde_json::from_value(json!({"Subject": "Amazon S3 Notification"}))
                .expect("envelope should parse");
        assert!(envelope.notification().is_err());
    }

    #[test]
    fn subject_marker_is_a_substring_match() {
        let envelope: Envelope = serde_json::from_value(json!({
            "Type": "Notification",
            "Subject": "Amazon S3 Notification for ingest",
            "Message": "{}"
        }))
        .expect("envelope should parse");
        assert!(envelope.is_storage_notification());
    }
}
