//! CBM device simulator
//!
//! Run with: cargo run --bin simulator
//!
//! Environment variables:
//! - DEVICE_ID: Simulated device identity (default: sim01)
//! - SIMULATION_INTERVAL: Seconds between readings (default: 5)
//! - MQTT_BROKER_HOST / MQTT_BROKER_PORT: Broker address (default: localhost:1883)
//! - RUST_LOG: Log level (default: info)

use std::time::Duration;

use cbm_alerter::config::SimulatorConfig;
use cbm_alerter::ingest::wait_for_connack;
use cbm_alerter::simulator::DeviceSimulator;
use rumqttc::{AsyncClient, QoS};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "simulator=info,cbm_alerter=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SimulatorConfig::from_env();
    let mut simulator = DeviceSimulator::new(config.device_id.clone(), rand::thread_rng());
    let topic = simulator.topic();

    tracing::info!(
        device_id = %config.device_id,
        "Connecting to MQTT broker {}:{}",
        config.mqtt.host,
        config.mqtt.port
    );

    let (client, mut eventloop) = AsyncClient::new(config.mqtt.options(), 16);
    if let Err(e) = wait_for_connack(&mut eventloop, config.mqtt.connect_timeout).await {
        tracing::error!(device_id = %config.device_id, error = %e, "MQTT connection failed");
        return Err(e.into());
    }

    // The event loop has to keep being polled for publishes to go out
    let network = tokio::spawn(async move {
        loop {
            if let Err(e) = eventloop.poll().await {
                tracing::warn!(error = %e, "MQTT connection error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    });

    tracing::info!(
        "Simulator for device '{}' started. Publishing to '{}' every {:?}",
        config.device_id,
        topic,
        config.interval
    );

    let mut ticker = tokio::time::interval(config.interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = chrono::Utc::now().timestamp_micros() as f64 / 1e6;
                let payload = simulator.next_reading(now).to_string();

                match client.publish(topic.as_str(), QoS::AtMostOnce, false, payload.clone()).await {
                    Ok(()) => tracing::info!(device_id = %config.device_id, "Sent: {} to {}", payload, topic),
                    Err(e) => tracing::warn!(device_id = %config.device_id, error = %e, "Failed to publish"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(device_id = %config.device_id, "Simulator stopping...");
                break;
            }
        }
    }

    let _ = client.disconnect().await;
    // Let the DISCONNECT reach the broker before tearing the loop down
    tokio::time::sleep(Duration::from_millis(200)).await;
    network.abort();

    tracing::info!(device_id = %config.device_id, "Simulator disconnected");
    Ok(())
}
