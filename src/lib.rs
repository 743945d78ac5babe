//! CBM Alerter: condition-based-monitoring telemetry processor
//!
//! Devices publish JSON telemetry over MQTT. The processor decodes each
//! message, stores its numeric metrics as a time-series point, and a periodic
//! evaluator raises and resolves per-device temperature alerts with
//! hysteresis and a re-raise cooldown. Alert state is exported for Prometheus.
//!
//! # Features
//!
//! - **MQTT Ingestion**: Wildcard subscription, renewed on every reconnect
//! - **Time-Series Storage**: InfluxDB v2 over HTTP, or a bounded in-memory store
//! - **Threshold Alerting**: Raise above the threshold, resolve below threshold - hysteresis
//! - **Cooldown**: No re-raise within the cooldown of the previous alert
//! - **Prometheus Metrics**: Per-device temperature gauge and alert counter
//! - **Device Simulator**: Random-walk telemetry publisher for testing
//!
//! # Example
//!
//! ```no_run
//! use cbm_alerter::alerts::{AlertPolicy, AlertState, Transition};
//!
//! let policy = AlertPolicy::default();
//! let mut state = AlertState::default();
//!
//! let now = chrono::Utc::now();
//! assert_eq!(state.observe(36.0, now, &policy), Transition::Raised);
//! assert_eq!(state.observe(33.9, now, &policy), Transition::Resolved);
//! ```

pub mod alerts;
pub mod api;
pub mod config;
pub mod data;
pub mod ingest;
pub mod metrics;
pub mod service;
pub mod simulator;
pub mod storage;

// Re-export commonly used types
pub use alerts::{AlertEvaluator, AlertPolicy, AlertState};
pub use config::ServiceConfig;
pub use data::{decode_payload, TelemetryRecord};
pub use service::{run_service, ServiceError};
pub use storage::{StorageError, TimeSeriesStore};
