//! Prometheus metrics
//!
//! Exported series:
//! - `device_temperature_celsius{device_id}`: last temperature seen per device
//! - `temperature_alerts_total{device_id}`: alerts raised per device
//! - `telemetry_messages_total{outcome}`: ingest outcomes
//!
//! The registry is owned and passed around explicitly; clones share state.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use parking_lot::RwLock;
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

/// Label set keyed by device identity.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DeviceLabels {
    pub device_id: String,
}

impl DeviceLabels {
    fn new(device_id: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
        }
    }
}

/// What happened to an inbound telemetry message.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum IngestOutcome {
    Written,
    Malformed,
    Dropped,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabels {
    pub outcome: IngestOutcome,
}

/// Metrics written by the alert evaluator.
#[derive(Clone)]
pub struct AlertMetrics {
    temperature: Family<DeviceLabels, Gauge<f64, AtomicU64>>,
    alerts: Family<DeviceLabels, Counter>,
}

impl AlertMetrics {
    fn new(registry: &mut Registry) -> Self {
        let temperature = Family::<DeviceLabels, Gauge<f64, AtomicU64>>::default();
        registry.register(
            "device_temperature_celsius",
            "Latest temperature per device",
            temperature.clone(),
        );

        // The text encoder appends `_total` to counters.
        let alerts = Family::<DeviceLabels, Counter>::default();
        registry.register(
            "temperature_alerts",
            "Total number of temperature alerts triggered",
            alerts.clone(),
        );

        Self {
            temperature,
            alerts,
        }
    }

    pub fn set_temperature(&self, device_id: &str, value: f64) {
        self.temperature
            .get_or_create(&DeviceLabels::new(device_id))
            .set(value);
    }

    // Reads go through `get_or_create`; keep them out of the service so
    // lookups never add series to the exposition.
    #[cfg(test)]
    pub fn temperature(&self, device_id: &str) -> f64 {
        self.temperature
            .get_or_create(&DeviceLabels::new(device_id))
            .get()
    }

    pub fn inc_alerts(&self, device_id: &str) {
        self.alerts.get_or_create(&DeviceLabels::new(device_id)).inc();
    }

    #[cfg(test)]
    pub fn alerts_total(&self, device_id: &str) -> u64 {
        self.alerts.get_or_create(&DeviceLabels::new(device_id)).get()
    }
}

/// Metrics written by the ingest path.
#[derive(Clone)]
pub struct IngestMetrics {
    messages: Family<OutcomeLabels, Counter>,
}

impl IngestMetrics {
    fn new(registry: &mut Registry) -> Self {
        let messages = Family::<OutcomeLabels, Counter>::default();
        registry.register(
            "telemetry_messages",
            "Inbound telemetry messages by outcome",
            messages.clone(),
        );
        Self { messages }
    }

    pub fn record(&self, outcome: IngestOutcome) {
        self.messages.get_or_create(&OutcomeLabels { outcome }).inc();
    }

    #[cfg(test)]
    pub fn count(&self, outcome: IngestOutcome) -> u64 {
        self.messages.get_or_create(&OutcomeLabels { outcome }).get()
    }
}

/// Process-wide metrics registry.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Arc<RwLock<Registry>>,
    alerts: AlertMetrics,
    ingest: IngestMetrics,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let alerts = AlertMetrics::new(&mut registry);
        let ingest = IngestMetrics::new(&mut registry);

        Self {
            registry: Arc::new(RwLock::new(registry)),
            alerts,
            ingest,
        }
    }

    pub fn alerts(&self) -> &AlertMetrics {
        &self.alerts
    }

    pub fn ingest(&self) -> &IngestMetrics {
        &self.ingest
    }

    /// Encode all metrics in Prometheus text format
    pub fn encode(&self) -> String {
        let registry = self.registry.read();
        let mut buffer = String::new();
        if encode(&mut buffer, &registry).is_err() {
            tracing::error!("Failed to encode prometheus metrics");
            return String::new();
        }
        buffer
    }

    pub const fn content_type() -> &'static str {
        "application/openmetrics-text; version=1.0.0; charset=utf-8"
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
