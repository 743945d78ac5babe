//! Time-series writer for the ingest path
//!
//! Writes are not retried and not queued. A failed write is logged and the
//! sample is gone; ingestion keeps flowing.

use std::sync::Arc;

use super::TimeSeriesStore;
use crate::data::{StoragePoint, TelemetryRecord};

/// Result of persisting one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Dropped,
}

#[derive(Clone)]
pub struct TimeSeriesWriter {
    store: Arc<dyn TimeSeriesStore>,
}

impl TimeSeriesWriter {
    pub fn new(store: Arc<dyn TimeSeriesStore>) -> Self {
        Self { store }
    }

    pub async fn write(&self, record: &TelemetryRecord) -> WriteOutcome {
        if record.metrics.is_empty() {
            tracing::warn!(device_id = %record.device_id, "Record has no numeric fields, dropping");
            return WriteOutcome::Dropped;
        }

        let point = StoragePoint::from(record);
        match self.store.write_point(&point).await {
            Ok(()) => {
                tracing::debug!(
                    device_id = %record.device_id,
                    fields = point.fields.len(),
                    timestamp_ns = point.timestamp_ns,
                    "Point written"
                );
                WriteOutcome::Written
            }
            Err(e) => {
                tracing::warn!(
                    device_id = %record.device_id,
                    error = %e,
                    "Storage write failed, dropping point"
                );
                WriteOutcome::Dropped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use std::collections::BTreeMap;

    fn record(fields: &[(&str, f64)]) -> TelemetryRecord {
        TelemetryRecord {
            device_id: "sim01".to_string(),
            timestamp: chrono::Utc::now().timestamp() as f64,
            metrics: fields
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[tokio::test]
    async fn test_write_persists_point() {
        let store = Arc::new(InMemoryStore::new());
        let writer = TimeSeriesWriter::new(store.clone());

        let outcome = writer.write(&record(&[("temperature_celsius", 30.0)])).await;
        assert_eq!(outcome, WriteOutcome::Written);
        assert_eq!(store.point_count(), 1);
    }

    #[tokio::test]
    async fn test_write_failure_drops() {
        let store = Arc::new(InMemoryStore::new());
        store.close().await;
        let writer = TimeSeriesWriter::new(store.clone());

        let outcome = writer.write(&record(&[("temperature_celsius", 30.0)])).await;
        assert_eq!(outcome, WriteOutcome::Dropped);
    }

    #[tokio::test]
    async fn test_record_without_metrics_is_dropped() {
        let store = Arc::new(InMemoryStore::new());
        let writer = TimeSeriesWriter::new(store.clone());

        assert_eq!(writer.write(&record(&[])).await, WriteOutcome::Dropped);
        assert_eq!(store.point_count(), 0);
    }
}
