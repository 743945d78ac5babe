//! InfluxDB v2 backend
//!
//! Talks to the HTTP API directly:
//! - `POST /api/v2/write` with line protocol at nanosecond precision
//! - `POST /api/v2/query` with a Flux query, CSV response
//! - `GET /health`
//!
//! ## Configuration
//!
//! Environment variables:
//! - `INFLUXDB_URL`: Base URL (default: http://localhost:8086)
//! - `INFLUXDB_TOKEN`: API token
//! - `INFLUXDB_ORG`: Organisation (default: my-cbm-org)
//! - `INFLUXDB_BUCKET`: Bucket (default: cbm_data)

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;

use super::{LatestValue, StorageError, TimeSeriesStore};
use crate::config::env_or;
use crate::data::{StoragePoint, DEVICE_TAG, MEASUREMENT};

/// InfluxDB connection settings
#[derive(Clone)]
pub struct InfluxConfig {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
    /// Per-request HTTP timeout
    pub timeout: Duration,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8086".to_string(),
            token: "mysecretadmintoken".to_string(),
            org: "my-cbm-org".to_string(),
            bucket: "cbm_data".to_string(),
            timeout: Duration::from_secs(20),
        }
    }
}

impl InfluxConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: env_or("INFLUXDB_URL", defaults.url),
            token: env_or("INFLUXDB_TOKEN", defaults.token),
            org: env_or("INFLUXDB_ORG", defaults.org),
            bucket: env_or("INFLUXDB_BUCKET", defaults.bucket),
            timeout: defaults.timeout,
        }
    }
}

// Keep the token out of logs.
impl std::fmt::Debug for InfluxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfluxConfig")
            .field("url", &self.url)
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

/// InfluxDB v2 store
pub struct InfluxStore {
    client: reqwest::Client,
    config: InfluxConfig,
    open: AtomicBool,
}

impl InfluxStore {
    /// Build a client without touching the network
    pub fn new(config: InfluxConfig) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StorageError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            open: AtomicBool::new(true),
        })
    }

    /// Build a client and verify the server reports healthy
    pub async fn connect(config: InfluxConfig) -> Result<Self, StorageError> {
        let store = Self::new(config)?;
        store.health().await?;
        Ok(store)
    }

    pub fn config(&self) -> &InfluxConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.url.trim_end_matches('/'), path)
    }

    fn auth_header(&self) -> String {
        format!("Token {}", self.config.token)
    }

    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::Unavailable("connection closed".to_string()))
        }
    }
}

#[async_trait]
impl TimeSeriesStore for InfluxStore {
    async fn write_point(&self, point: &StoragePoint) -> Result<(), StorageError> {
        self.ensure_open()?;

        let response = self
            .client
            .post(self.endpoint("/api/v2/write"))
            .query(&[
                ("org", self.config.org.as_str()),
                ("bucket", self.config.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header(AUTHORIZATION, self.auth_header())
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(point.to_line_protocol())
            .send()
            .await
            .map_err(|e| StorageError::Write(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Write(format!("status {}: {}", status, body)));
        }

        Ok(())
    }

    async fn latest_values(
        &self,
        field: &str,
        lookback: Duration,
    ) -> Result<Vec<LatestValue>, StorageError> {
        self.ensure_open()?;

        let body = serde_json::json!({
            "query": latest_value_flux(&self.config.bucket, field, lookback),
            "type": "flux",
            "dialect": {
                "header": true,
                "delimiter": ",",
                "annotations": [],
            },
        });

        let response = self
            .client
            .post(self.endpoint("/api/v2/query"))
            .query(&[("org", self.config.org.as_str())])
            .header(AUTHORIZATION, self.auth_header())
            .header(ACCEPT, "application/csv")
            .json(&body)
            .send()
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        if !status.is_success() {
            return Err(StorageError::Query(format!("status {}: {}", status, text)));
        }

        parse_latest_csv(&text)
    }

    async fn health(&self) -> Result<(), StorageError> {
        self.ensure_open()?;

        let response = self
            .client
            .get(self.endpoint("/health"))
            .send()
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        let health: HealthResponse = response
            .json()
            .await
            .map_err(|e| StorageError::Unavailable(format!("Invalid health response: {}", e)))?;

        if health.status == "pass" {
            Ok(())
        } else {
            Err(StorageError::Unavailable(format!(
                "health check failed: {}",
                health.message.unwrap_or(health.status)
            )))
        }
    }

    fn is_available(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        tracing::debug!(url = %self.config.url, "InfluxDB connection closed");
    }
}

/// Flux query returning the last value of `field` per device
pub fn latest_value_flux(bucket: &str, field: &str, lookback: Duration) -> String {
    format!(
        r#"from(bucket: {bucket})
  |> range(start: -{secs}s)
  |> filter(fn: (r) => r["_measurement"] == {measurement})
  |> filter(fn: (r) => r["_field"] == {field})
  |> group(columns: [{tag}])
  |> last()"#,
        bucket = flux_string(bucket),
        secs = lookback.as_secs().max(1),
        measurement = flux_string(MEASUREMENT),
        field = flux_string(field),
        tag = flux_string(DEVICE_TAG),
    )
}

fn flux_string(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Parse an un-annotated Flux CSV response into latest values
///
/// Each result table starts with its own header row; tables are separated by
/// blank lines. An `error` column means the query failed server side.
fn parse_latest_csv(body: &str) -> Result<Vec<LatestValue>, StorageError> {
    let mut values = Vec::new();
    let mut columns: Option<CsvColumns> = None;

    for line in body.lines() {
        if line.trim().is_empty() {
            columns = None;
            continue;
        }

        let fields = split_csv_line(line);

        if columns.is_none() {
            columns = Some(CsvColumns::from_header(&fields)?);
            continue;
        }
        let Some(cols) = columns.as_ref() else {
            continue;
        };

        if let Some(idx) = cols.error {
            let message = fields.get(idx).cloned().unwrap_or_default();
            return Err(StorageError::Query(message));
        }

        let (Some(device_idx), Some(value_idx)) = (cols.device_id, cols.value) else {
            continue;
        };

        let device_id = match fields.get(device_idx) {
            Some(d) if !d.is_empty() => d.clone(),
            _ => continue,
        };

        let value = match fields.get(value_idx).and_then(|v| v.parse::<f64>().ok()) {
            Some(v) => v,
            None => {
                tracing::debug!(device_id = %device_id, "Skipping non-numeric query value");
                continue;
            }
        };

        let time = cols
            .time
            .and_then(|idx| fields.get(idx))
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc));

        values.push(LatestValue {
            device_id,
            value,
            time,
        });
    }

    Ok(values)
}

struct CsvColumns {
    device_id: Option<usize>,
    value: Option<usize>,
    time: Option<usize>,
    error: Option<usize>,
}

impl CsvColumns {
    fn from_header(fields: &[String]) -> Result<Self, StorageError> {
        let find = |name: &str| fields.iter().position(|f| f == name);
        let cols = Self {
            device_id: find(DEVICE_TAG),
            value: find("_value"),
            time: find("_time"),
            error: find("error"),
        };

        if cols.value.is_none() && cols.error.is_none() {
            return Err(StorageError::Query(format!(
                "unexpected CSV header: {}",
                fields.join(",")
            )));
        }
        Ok(cols)
    }
}

/// Split one CSV line, honouring double-quoted fields
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}
