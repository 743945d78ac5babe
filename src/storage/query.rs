//! Latest-value query used by the alert evaluator

use std::sync::Arc;
use std::time::Duration;

use super::{LatestValue, StorageError, TimeSeriesStore};

/// How far back a device's last sample may be and still count
pub const LOOKBACK_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Latest value of one field per device over a fixed lookback window.
/// Devices silent for longer than the window are simply absent.
#[derive(Clone)]
pub struct LatestValueQuery {
    store: Arc<dyn TimeSeriesStore>,
    field: String,
    lookback: Duration,
}

impl LatestValueQuery {
    pub fn new(store: Arc<dyn TimeSeriesStore>, field: impl Into<String>) -> Self {
        Self {
            store,
            field: field.into(),
            lookback: LOOKBACK_WINDOW,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn lookback(&self) -> Duration {
        self.lookback
    }

    /// Whether the backing store can currently serve queries
    pub fn is_available(&self) -> bool {
        self.store.is_available()
    }

    pub async fn fetch(&self) -> Result<Vec<LatestValue>, StorageError> {
        self.store.latest_values(&self.field, self.lookback).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{StoragePoint, MEASUREMENT};
    use crate::storage::InMemoryStore;

    #[tokio::test]
    async fn test_fetch_uses_field_and_window() {
        let store = Arc::new(InMemoryStore::new());
        let now_ns = chrono::Utc::now().timestamp_nanos_opt().unwrap();
        store
            .write_point(&StoragePoint {
                measurement: MEASUREMENT.to_string(),
                device_id: "sim01".to_string(),
                timestamp_ns: now_ns - 1_000_000_000,
                fields: [("temperature_celsius".to_string(), 36.0), ("vibration_mm_s".to_string(), 1.2)]
                    .into_iter()
                    .collect(),
            })
            .await
            .unwrap();

        let query = LatestValueQuery::new(store, "temperature_celsius");
        assert_eq!(query.lookback(), Duration::from_secs(300));

        let values = query.fetch().await.unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].device_id, "sim01");
        assert_eq!(values[0].value, 36.0);
    }
}
