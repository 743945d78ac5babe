//! Alert policy

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::env_or;

/// Field the evaluator watches
pub const TEMPERATURE_FIELD: &str = "temperature_celsius";

/// Threshold alert policy with hysteresis and cooldown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPolicy {
    /// Metric field to evaluate
    pub field: String,
    /// Values strictly above this raise an alert
    pub threshold: f64,
    /// An active alert resolves only at or below `threshold - hysteresis`
    pub hysteresis: f64,
    /// Minimum time between raises for a device that stays above threshold
    #[serde(with = "duration_secs")]
    pub cooldown: Duration,
    /// Evaluation interval
    #[serde(with = "duration_secs")]
    pub interval: Duration,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            field: TEMPERATURE_FIELD.to_string(),
            threshold: 35.0,
            hysteresis: 1.0,
            cooldown: Duration::from_secs(60),
            interval: Duration::from_secs(10),
        }
    }
}

impl AlertPolicy {
    /// Policy from `ALERT_THRESHOLD_TEMP` and `ALERT_CHECK_INTERVAL`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let interval_secs: u64 = env_or("ALERT_CHECK_INTERVAL", defaults.interval.as_secs());

        Self {
            threshold: env_or("ALERT_THRESHOLD_TEMP", defaults.threshold),
            interval: Duration::from_secs(interval_secs.max(1)),
            ..defaults
        }
    }

    /// Set threshold
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set cooldown
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Set evaluation interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Value at or below which an active alert resolves
    pub fn resolve_level(&self) -> f64 {
        self.threshold - self.hysteresis
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
