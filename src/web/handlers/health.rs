//! Health and readiness endpoints

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::services::CacheStats;
use crate::web::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub ready: bool,
    pub uptime_seconds: i64,
    pub in_flight: usize,
    pub cache: CacheStats,
}

/// Readiness probe
///
/// `200` once the listener is bound, `503` before that and while shutting down
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.readiness.is_ready() {
        (StatusCode::OK, "ready\n")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready\n")
    }
}

/// Health check endpoint
///
/// Reports process status together with cache counters
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = chrono::Utc::now() - state.started_at;
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        ready: state.readiness.is_ready(),
        uptime_seconds: uptime.num_seconds(),
        in_flight: state.previews.in_flight(),
        cache: state.previews.cache().stats().await,
    })
}
