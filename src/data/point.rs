//! Storage points and their line-protocol encoding

use std::collections::BTreeMap;
use std::fmt::Write;

use super::record::TelemetryRecord;

/// Measurement every telemetry point is written under
pub const MEASUREMENT: &str = "machine_metrics";
/// Tag key holding the device identity
pub const DEVICE_TAG: &str = "device_id";

/// A single point destined for the time-series store
#[derive(Debug, Clone, PartialEq)]
pub struct StoragePoint {
    pub measurement: String,
    pub device_id: String,
    /// Nanoseconds since the epoch
    pub timestamp_ns: i64,
    pub fields: BTreeMap<String, f64>,
}

impl StoragePoint {
    /// Encode as one line of InfluxDB line protocol
    ///
    /// `machine_metrics,device_id=sim01 temperature_celsius=36.2 1700000000000000000`
    pub fn to_line_protocol(&self) -> String {
        let mut line = String::with_capacity(64 + self.fields.len() * 24);
        line.push_str(&escape_measurement(&self.measurement));
        line.push(',');
        line.push_str(&escape_key(DEVICE_TAG));
        line.push('=');
        line.push_str(&escape_key(&self.device_id));
        line.push(' ');

        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            let _ = write!(line, "{}={}", escape_key(name), value);
        }

        let _ = write!(line, " {}", self.timestamp_ns);
        line
    }
}

impl From<&TelemetryRecord> for StoragePoint {
    fn from(record: &TelemetryRecord) -> Self {
        Self {
            measurement: MEASUREMENT.to_string(),
            device_id: record.device_id.clone(),
            timestamp_ns: record.timestamp_nanos(),
            fields: record.metrics.clone(),
        }
    }
}

fn escape_measurement(s: &str) -> String {
    escape(s, &[',', ' '])
}

/// Escaping shared by tag keys, tag values and field keys
fn escape_key(s: &str) -> String {
    escape(s, &[',', '=', ' '])
}

/// Backslash-escape `special`, plus backslashes and control whitespace so a
/// value can never end the line or swallow a separator
fn escape(s: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if special.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}
