//! Time-series storage
//!
//! The alerter only needs two things from storage: point writes on the ingest
//! path and a "latest value per device" query on the evaluation path. Both go
//! through [`TimeSeriesStore`] so the evaluator can run against InfluxDB or the
//! in-process store.

pub mod connect;
pub mod influx;
pub mod memory;
pub mod query;
pub mod writer;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::data::StoragePoint;

pub use connect::{connect_with_retry, RetryPolicy};
pub use influx::{InfluxConfig, InfluxStore};
pub use memory::InMemoryStore;
pub use query::{LatestValueQuery, LOOKBACK_WINDOW};
pub use writer::{TimeSeriesWriter, WriteOutcome};

/// Most recent value of one field for one device
#[derive(Debug, Clone, PartialEq)]
pub struct LatestValue {
    pub device_id: String,
    pub value: f64,
    /// Time of the sample, when the backend reports it
    pub time: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    /// Persist a single point
    async fn write_point(&self, point: &StoragePoint) -> Result<(), StorageError>;

    /// Latest value of `field` per device over the trailing `lookback` window
    async fn latest_values(
        &self,
        field: &str,
        lookback: Duration,
    ) -> Result<Vec<LatestValue>, StorageError>;

    /// Round-trip readiness check against the backend
    async fn health(&self) -> Result<(), StorageError>;

    /// Whether the query side is usable right now. Cheap, no I/O.
    fn is_available(&self) -> bool {
        true
    }

    /// Release the connection. Later calls fail or report unavailable.
    async fn close(&self) {}
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Write error: {0}")]
    Write(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Storage still unavailable after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}
