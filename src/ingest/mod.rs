//! Ingest path
//!
//! MQTT subscription → [`TelemetryIngest`] handler → decoder → writer.

pub mod handler;
pub mod mqtt;

pub use handler::{MessageHandler, TelemetryIngest};
pub use mqtt::{wait_for_connack, IngestError, MqttConfig, MqttSubscriber, SubscriptionHandle, TOPIC_PREFIX};
