//! Processor/alerter service wiring
//!
//! Startup order: storage (bounded retry) → MQTT (fatal on failure) →
//! ingestion → evaluator → metrics endpoint. Ctrl-C tears everything down in
//! reverse and releases the storage connection last.

use std::sync::Arc;

use crate::alerts::{AlertEvaluator, Notifier};
use crate::api::{AppState, MetricsServer};
use crate::config::{ServiceConfig, StorageBackend};
use crate::ingest::{IngestError, MqttSubscriber, TelemetryIngest};
use crate::metrics::MetricsRegistry;
use crate::storage::{
    connect_with_retry, InMemoryStore, InfluxStore, LatestValueQuery, StorageError,
    TimeSeriesStore, TimeSeriesWriter,
};

/// Fatal service errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Transport(#[from] IngestError),

    #[error("Metrics server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Connect to the configured storage backend
pub async fn connect_storage(
    config: &ServiceConfig,
) -> Result<Arc<dyn TimeSeriesStore>, StorageError> {
    match config.backend {
        StorageBackend::Influx => {
            let store = connect_with_retry(config.storage_retry, || {
                InfluxStore::connect(config.influx.clone())
            })
            .await?;
            tracing::info!(
                org = %config.influx.org,
                bucket = %config.influx.bucket,
                "Connected to InfluxDB at {}",
                config.influx.url
            );
            Ok(Arc::new(store))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

/// Run the service until Ctrl-C
pub async fn run_service(config: ServiceConfig) -> Result<(), ServiceError> {
    let metrics = MetricsRegistry::new();
    let store = connect_storage(&config).await?;

    let subscriber = match MqttSubscriber::connect(config.mqtt.clone()).await {
        Ok(subscriber) => subscriber,
        Err(e) => {
            tracing::error!(error = %e, "MQTT connection failed");
            store.close().await;
            return Err(e.into());
        }
    };

    let ingest = Arc::new(TelemetryIngest::new(
        TimeSeriesWriter::new(Arc::clone(&store)),
        metrics.ingest().clone(),
    ));
    let subscription = subscriber.start(ingest);

    let evaluator = AlertEvaluator::new(
        config.policy.clone(),
        LatestValueQuery::new(Arc::clone(&store), config.policy.field.clone()),
        metrics.alerts().clone(),
        Notifier::with_targets(config.notify_targets.clone()),
    );
    let evaluator = evaluator.start();

    let state = Arc::new(AppState {
        metrics: metrics.clone(),
        store: Arc::clone(&store),
        policy: config.policy.clone(),
    });
    let server = match MetricsServer::start(&config.metrics_addr(), state).await {
        Ok(server) => server,
        Err(e) => {
            subscription.stop().await;
            evaluator.stop().await;
            store.close().await;
            return Err(e.into());
        }
    };

    tracing::info!("Processor and alerter started, waiting for messages");

    shutdown_signal().await;

    tracing::info!("Shutdown signal received, stopping...");
    subscription.stop().await;
    if let Some(evaluator) = evaluator.stop().await {
        tracing::info!(
            devices = evaluator.states().len(),
            alerting = evaluator.states().alerting_devices().len(),
            "Alert evaluator stopped"
        );
    }
    server.stop().await;
    store.close().await;

    tracing::info!("Processor and alerter disconnected and closed");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for CTRL+C");
        std::future::pending::<()>().await;
    }
}
