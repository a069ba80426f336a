//! Relays S3 notifications, delivered through SNS and SQS, to Step
//! Functions state machine executions.

pub mod app;
pub mod conf;
pub mod correlation;
pub mod dispatch;
pub mod error;
pub mod notification;
pub mod relay;
