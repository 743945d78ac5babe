//! Telemetry message handling

use async_trait::async_trait;

use crate::data::decode_payload;
use crate::metrics::{IngestMetrics, IngestOutcome};
use crate::storage::{TimeSeriesWriter, WriteOutcome};

/// Handler invoked once per inbound message on a subscription
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, topic: &str, payload: &[u8]);
}

/// Decodes telemetry and writes it to storage
pub struct TelemetryIngest {
    writer: TimeSeriesWriter,
    metrics: IngestMetrics,
}

impl TelemetryIngest {
    pub fn new(writer: TimeSeriesWriter, metrics: IngestMetrics) -> Self {
        Self {
            writer,
            metrics,
        }
    }
}

#[async_trait]
impl MessageHandler for TelemetryIngest {
    async fn handle(&self, topic: &str, payload: &[u8]) {
        let record = match decode_payload(payload) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(
                    topic = %topic,
                    error = %e,
                    payload = %String::from_utf8_lossy(payload),
                    "Dropping undecodable message"
                );
                self.metrics.record(IngestOutcome::Malformed);
                return;
            }
        };

        let outcome = match self.writer.write(&record).await {
            WriteOutcome::Written => IngestOutcome::Written,
            WriteOutcome::Dropped => IngestOutcome::Dropped,
        };
        self.metrics.record(outcome);
    }
}
