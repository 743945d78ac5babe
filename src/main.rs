//! CBM Processor & Alerter
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - MQTT_BROKER_HOST / MQTT_BROKER_PORT: Broker address (default: localhost:1883)
//! - MQTT_TOPIC: Subscription filter (default: cbm/data/#)
//! - STORAGE_BACKEND: `influx` or `memory` (default: influx)
//! - INFLUXDB_URL / INFLUXDB_TOKEN / INFLUXDB_ORG / INFLUXDB_BUCKET: InfluxDB v2 connection
//! - ALERT_THRESHOLD_TEMP: Temperature threshold in °C (default: 35.0)
//! - ALERT_CHECK_INTERVAL: Seconds between alert checks (default: 10)
//! - ALERT_WEBHOOK_URL: Optional webhook receiving alert events as JSON
//! - METRICS_HOST / METRICS_PORT: Prometheus endpoint bind address (default: 0.0.0.0:8000)
//! - RUST_LOG: Log level (default: info)

use cbm_alerter::config::ServiceConfig;
use cbm_alerter::run_service;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cbm_alerter=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServiceConfig::from_env();

    tracing::info!("CBM processor/alerter configuration:");
    tracing::info!("  MQTT broker: {}:{}", config.mqtt.host, config.mqtt.port);
    tracing::info!("  Subscription: {}", config.mqtt.topic);
    tracing::info!("  Storage backend: {:?}", config.backend);
    tracing::info!(
        "  InfluxDB: {} (org: {}, bucket: {})",
        config.influx.url,
        config.influx.org,
        config.influx.bucket
    );
    tracing::info!(
        "  Alert: {} > {} (hysteresis {}, cooldown {:?})",
        config.policy.field,
        config.policy.threshold,
        config.policy.hysteresis,
        config.policy.cooldown
    );
    tracing::info!("  Check interval: {:?}", config.policy.interval);
    tracing::info!("  Notification targets: {}", config.notify_targets.len());
    tracing::info!("  Metrics: http://{}/metrics", config.metrics_addr());

    run_service(config).await?;
    Ok(())
}
