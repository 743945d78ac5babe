//! In-process time-series store
//!
//! Keeps points per `(measurement, device)` series ordered by timestamp.
//! Points sharing a timestamp merge their fields, as InfluxDB does. Series are
//! pruned on write once samples fall outside the retention window.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::{LatestValue, StorageError, TimeSeriesStore};
use crate::data::{StoragePoint, MEASUREMENT};

type SeriesKey = (String, String);
type Series = BTreeMap<i64, HashMap<String, f64>>;

pub struct InMemoryStore {
    series: DashMap<SeriesKey, Series>,
    retention: Duration,
    open: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_retention(Duration::from_secs(3600))
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            series: DashMap::new(),
            retention,
            open: AtomicBool::new(true),
        }
    }

    /// Total number of stored timestamps across all series
    pub fn point_count(&self) -> usize {
        self.series.iter().map(|e| e.value().len()).sum()
    }

    fn now_ns() -> i64 {
        Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
    }

    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::Unavailable("store is closed".to_string()))
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TimeSeriesStore for InMemoryStore {
    async fn write_point(&self, point: &StoragePoint) -> Result<(), StorageError> {
        self.ensure_open()?;
        if point.fields.is_empty() {
            return Err(StorageError::Write("point has no fields".to_string()));
        }

        let cutoff = Self::now_ns().saturating_sub(self.retention.as_nanos() as i64);
        let key = (point.measurement.clone(), point.device_id.clone());
        let mut series = self.series.entry(key).or_default();

        series
            .entry(point.timestamp_ns)
            .or_default()
            .extend(point.fields.iter().map(|(k, v)| (k.clone(), *v)));

        // Drop everything older than the retention window
        let kept = series.split_off(&cutoff);
        *series = kept;

        Ok(())
    }

    async fn latest_values(
        &self,
        field: &str,
        lookback: Duration,
    ) -> Result<Vec<LatestValue>, StorageError> {
        self.ensure_open()?;

        let now = Self::now_ns();
        let start = now.saturating_sub(lookback.as_nanos() as i64);

        let mut latest: Vec<LatestValue> = self
            .series
            .iter()
            .filter(|entry| entry.key().0 == MEASUREMENT)
            .filter_map(|entry| {
                let (ts, value) = entry
                    .value()
                    .range(start..=now)
                    .rev()
                    .find_map(|(ts, fields)| fields.get(field).map(|v| (*ts, *v)))?;

                Some(LatestValue {
                    device_id: entry.key().1.clone(),
                    value,
                    time: Some(DateTime::from_timestamp_nanos(ts)),
                })
            })
            .collect();

        latest.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        Ok(latest)
    }

    async fn health(&self) -> Result<(), StorageError> {
        self.ensure_open()
    }

    fn is_available(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}
