//! Simulated CBM device
//!
//! Temperature follows a random walk biased upwards so thresholds get crossed;
//! vibration loosely tracks temperature.

use rand::Rng;

use crate::ingest::TOPIC_PREFIX;

const TEMP_RANGE: (f64, f64) = (15.0, 50.0);
const VIBRATION_RANGE: (f64, f64) = (0.0, 10.0);

pub struct DeviceSimulator<R: Rng> {
    device_id: String,
    temperature: f64,
    rng: R,
}

impl<R: Rng> DeviceSimulator<R> {
    pub fn new(device_id: impl Into<String>, rng: R) -> Self {
        Self {
            device_id: device_id.into(),
            temperature: 20.0,
            rng,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Topic this device publishes to
    pub fn topic(&self) -> String {
        format!("{}/{}", TOPIC_PREFIX, self.device_id)
    }

    /// Advance the simulation and build the payload for time `now_secs`
    pub fn next_reading(&mut self, now_secs: f64) -> serde_json::Value {
        self.temperature += self.rng.gen_range(-0.2..1.0);
        self.temperature = round_to(self.temperature.clamp(TEMP_RANGE.0, TEMP_RANGE.1), 2);

        let vibration = self.rng.gen_range(0.1..3.0) + (self.temperature - 20.0) / 10.0;
        let vibration = round_to(vibration.clamp(VIBRATION_RANGE.0, VIBRATION_RANGE.1), 2);

        serde_json::json!({
            "device_id": self.device_id,
            "timestamp": now_secs,
            "temperature_celsius": self.temperature,
            "vibration_mm_s": vibration,
            "operating_hours": round_to((now_secs / 3600.0) % 1000.0, 1),
        })
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
