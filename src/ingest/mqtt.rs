//! MQTT subscription for device telemetry
//!
//! Subscribes to `cbm/data/#` and hands every publish to a registered
//! [`MessageHandler`]. The broker connection is established up front so a
//! broker that cannot be reached fails startup; after that, reconnection is
//! left to the client's event loop and the subscription is renewed on every
//! fresh CONNACK.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `MQTT_BROKER_HOST`: Broker host (default: localhost)
//! - `MQTT_BROKER_PORT`: Broker port (default: 1883)
//! - `MQTT_CLIENT_ID`: Client id (default: processor-alerter-sub)
//! - `MQTT_TOPIC`: Topic filter (default: cbm/data/#)

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;

use super::handler::MessageHandler;
use crate::config::env_or;

/// Topic prefix devices publish under
pub const TOPIC_PREFIX: &str = "cbm/data";

/// MQTT connection configuration
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    /// Topic filter to subscribe to
    pub topic: String,
    pub keep_alive: Duration,
    /// How long to wait for the broker's CONNACK at startup
    pub connect_timeout: Duration,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "processor-alerter-sub".to_string(),
            topic: format!("{}/#", TOPIC_PREFIX),
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl MqttConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_or("MQTT_BROKER_HOST", defaults.host),
            port: env_or("MQTT_BROKER_PORT", defaults.port),
            client_id: env_or("MQTT_CLIENT_ID", defaults.client_id),
            topic: env_or("MQTT_TOPIC", defaults.topic),
            ..defaults
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(self.keep_alive);
        options
    }
}

/// Drive the event loop until the broker acknowledges the connection
pub async fn wait_for_connack(
    eventloop: &mut EventLoop,
    timeout: Duration,
) -> Result<(), IngestError> {
    let connect = async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
                Ok(_) => continue,
                Err(e) => return Err(IngestError::Connect(e.to_string())),
            }
        }
    };

    tokio::time::timeout(timeout, connect)
        .await
        .map_err(|_| IngestError::Connect(format!("no CONNACK within {:?}", timeout)))?
}

/// A connected, subscribed MQTT client waiting for a handler
pub struct MqttSubscriber {
    config: MqttConfig,
    client: AsyncClient,
    eventloop: EventLoop,
}

impl MqttSubscriber {
    /// Connect to the broker and subscribe. Failure here is fatal for the caller.
    pub async fn connect(config: MqttConfig) -> Result<Self, IngestError> {
        tracing::info!(
            host = %config.host,
            port = config.port,
            "Connecting to MQTT broker"
        );

        let (client, mut eventloop) = AsyncClient::new(config.options(), 64);
        wait_for_connack(&mut eventloop, config.connect_timeout).await?;
        tracing::info!(host = %config.host, port = config.port, "Connected to MQTT broker");

        client
            .try_subscribe(config.topic.as_str(), QoS::AtMostOnce)
            .map_err(|e| IngestError::Subscribe(e.to_string()))?;
        tracing::info!(topic = %config.topic, "Subscribed to MQTT topic");

        Ok(Self {
            config,
            client,
            eventloop,
        })
    }

    /// Register the handler and start delivering messages in the background
    pub fn start(self, handler: Arc<dyn MessageHandler>) -> SubscriptionHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let client = self.client.clone();
        let topic = self.config.topic;
        let mut eventloop = self.eventloop;

        let join = tokio::spawn(async move {
            tracing::info!(topic = %topic, "MQTT subscription started");

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("MQTT subscription shutting down");
                        let _ = client.try_disconnect();
                        // Best effort: give the DISCONNECT one poll to go out
                        let _ = tokio::time::timeout(Duration::from_secs(1), eventloop.poll()).await;
                        break;
                    }
                    event = eventloop.poll() => {
                        match event {
                            Ok(Event::Incoming(Packet::Publish(publish))) => {
                                handler.handle(&publish.topic, &publish.payload).await;
                            }
                            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                                tracing::info!("Reconnected to MQTT broker, renewing subscription");
                                if let Err(e) = client.try_subscribe(topic.as_str(), QoS::AtMostOnce) {
                                    tracing::error!(error = %e, "Failed to renew MQTT subscription");
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                tracing::error!(error = %e, "MQTT connection error");
                                // Back off before the event loop reconnects
                                tokio::time::sleep(Duration::from_secs(1)).await;
                            }
                        }
                    }
                }
            }
        });

        SubscriptionHandle {
            shutdown_tx,
            join,
        }
    }
}

/// Handle to a running subscription
pub struct SubscriptionHandle {
    shutdown_tx: mpsc::Sender<()>,
    join: tokio::task::JoinHandle<()>,
}

impl SubscriptionHandle {
    /// Stop delivering messages and disconnect from the broker
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.join.await {
            tracing::error!(error = %e, "MQTT subscription task failed");
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Transport connect error: {0}")]
    Connect(String),

    #[error("Subscribe error: {0}")]
    Subscribe(String),
}
