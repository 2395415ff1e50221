use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::sync::Arc;

use super::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub uptime_seconds: u64,
}

/// GET /api/health
/// Liveness plus a database ping; 503 when storage is unreachable.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let timestamp = chrono::Utc::now().to_rfc3339();
    let uptime_seconds = state.start_time.elapsed().as_secs();

    match state.store().ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy",
                timestamp,
                uptime_seconds,
            }),
        ),
        Err(err) => {
            tracing::error!("Health check failed: {err}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy",
                    timestamp,
                    uptime_seconds,
                }),
            )
        }
    }
}
