//! Service configuration from the environment

use std::str::FromStr;
use std::time::Duration;

use crate::alerts::{AlertPolicy, NotifyTarget};
use crate::ingest::MqttConfig;
use crate::storage::{InfluxConfig, RetryPolicy};

/// Read `key` from the environment, falling back to `default` when it is
/// unset or does not parse
pub fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, "Invalid value in environment, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// Which time-series backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Influx,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "influx" | "influxdb" => Ok(Self::Influx),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown storage backend: {}", other)),
        }
    }
}

/// Full configuration of the processor/alerter service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub mqtt: MqttConfig,
    pub backend: StorageBackend,
    pub influx: InfluxConfig,
    pub storage_retry: RetryPolicy,
    pub policy: AlertPolicy,
    pub notify_targets: Vec<NotifyTarget>,
    pub metrics_host: String,
    pub metrics_port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConfig::default(),
            backend: StorageBackend::Influx,
            influx: InfluxConfig::default(),
            storage_retry: RetryPolicy::default(),
            policy: AlertPolicy::default(),
            notify_targets: vec![NotifyTarget::Log],
            metrics_host: "0.0.0.0".to_string(),
            metrics_port: 8000,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let mut notify_targets = defaults.notify_targets;
        if let Ok(url) = std::env::var("ALERT_WEBHOOK_URL") {
            if !url.trim().is_empty() {
                notify_targets.push(NotifyTarget::Webhook {
                    url: url.trim().to_string(),
                    headers: Default::default(),
                });
            }
        }

        Self {
            mqtt: MqttConfig::from_env(),
            backend: env_or("STORAGE_BACKEND", defaults.backend),
            influx: InfluxConfig::from_env(),
            storage_retry: defaults.storage_retry,
            policy: AlertPolicy::from_env(),
            notify_targets,
            metrics_host: env_or("METRICS_HOST", defaults.metrics_host),
            metrics_port: env_or("METRICS_PORT", defaults.metrics_port),
        }
    }

    pub fn metrics_addr(&self) -> String {
        format!("{}:{}", self.metrics_host, self.metrics_port)
    }
}

/// Simulator configuration
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub mqtt: MqttConfig,
    pub device_id: String,
    pub interval: Duration,
}

impl SimulatorConfig {
    pub fn from_env() -> Self {
        let device_id = env_or("DEVICE_ID", "sim01".to_string());
        let interval_secs: u64 = env_or("SIMULATION_INTERVAL", 5);

        Self {
            mqtt: MqttConfig::from_env().with_client_id(format!("simulator-{}-pub", device_id)),
            device_id,
            interval: Duration::from_secs(interval_secs.max(1)),
        }
    }
}
