//! Service status endpoint.

use axum::{Json, extract::State};
use std::sync::Arc;

use super::{ApiResponse, AppState, HealthStatus};

/// Returns liveness and cache statistics.
///
/// # Endpoint
/// `GET /api/health`
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<ApiResponse<HealthStatus>> {
    Json(ApiResponse::success(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        cache_enabled: state.config.cache.enabled,
        cache_entries: state.cache.len().await,
    }))
}
