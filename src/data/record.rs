//! Telemetry decoding
//!
//! Devices publish one JSON object per sample:
//! ```json
//! {"device_id": "sim01", "timestamp": 1700000000.25, "temperature_celsius": 36.2}
//! ```
//! Every numeric field other than `device_id` and `timestamp` becomes a metric.

use std::collections::BTreeMap;

/// Key carrying the device identity
pub const DEVICE_ID_KEY: &str = "device_id";
/// Key carrying the sample time in seconds since the epoch
pub const TIMESTAMP_KEY: &str = "timestamp";
/// Identity used when a payload does not name its device
pub const UNKNOWN_DEVICE: &str = "unknown_device";

/// A decoded telemetry sample
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub device_id: String,
    /// Seconds since the epoch, as sent by the device
    pub timestamp: f64,
    pub metrics: BTreeMap<String, f64>,
}

impl TelemetryRecord {
    /// Timestamp in nanoseconds, floored
    pub fn timestamp_nanos(&self) -> i64 {
        (self.timestamp * 1e9).floor() as i64
    }
}

/// Decode a raw payload into a telemetry record
pub fn decode_payload(payload: &[u8]) -> Result<TelemetryRecord, DecodeError> {
    let value: serde_json::Value = serde_json::from_slice(payload)
        .map_err(|e| DecodeError::MalformedPayload(e.to_string()))?;

    let obj = value
        .as_object()
        .ok_or_else(|| DecodeError::MalformedPayload("expected JSON object".to_string()))?;

    let device_id = match obj.get(DEVICE_ID_KEY) {
        None | Some(serde_json::Value::Null) => UNKNOWN_DEVICE.to_string(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(other) => {
            return Err(DecodeError::MalformedPayload(format!(
                "'{}' must be a string, got {}",
                DEVICE_ID_KEY, other
            )))
        }
    };

    let timestamp = obj
        .get(TIMESTAMP_KEY)
        .ok_or_else(|| DecodeError::MalformedPayload(format!("missing '{}'", TIMESTAMP_KEY)))?
        .as_f64()
        .ok_or_else(|| {
            DecodeError::MalformedPayload(format!("'{}' must be numeric", TIMESTAMP_KEY))
        })?;

    // Lossy on purpose: strings, bools and nested values are not metrics.
    let metrics = obj
        .iter()
        .filter(|(key, _)| key.as_str() != DEVICE_ID_KEY && key.as_str() != TIMESTAMP_KEY)
        .filter_map(|(key, value)| value.as_f64().map(|v| (key.clone(), v)))
        .collect();

    Ok(TelemetryRecord {
        device_id,
        timestamp,
        metrics,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}
