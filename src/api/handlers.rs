use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::alerts::AlertPolicy;
use crate::metrics::MetricsRegistry;
use crate::storage::TimeSeriesStore;

/// Application state shared across handlers
pub struct AppState {
    pub metrics: MetricsRegistry,
    pub store: Arc<dyn TimeSeriesStore>,
    pub policy: AlertPolicy,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub storage: &'static str,
    pub alert_policy: AlertPolicy,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        storage: if state.store.is_available() {
            "available"
        } else {
            "unavailable"
        },
        alert_policy: state.policy.clone(),
    })
}

// ============================================================================
// Metrics
// ============================================================================

pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, MetricsRegistry::content_type())],
        state.metrics.encode(),
    )
        .into_response()
}
