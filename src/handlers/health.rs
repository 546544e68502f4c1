use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use tracing::{debug, warn};

use crate::models::HealthResponse;
use crate::AppState;

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Server is running".to_string(),
        timestamp: Utc::now(),
    })
}

/// Readiness check endpoint, reports the storage backend state
pub async fn ready_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    debug!("Readiness check requested");
    match state.storage.check() {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok".to_string(),
                message: "Service is ready".to_string(),
                timestamp: Utc::now(),
            }),
        ),
        Err(e) => {
            warn!("Storage not ready: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable".to_string(),
                    message: e.to_string(),
                    timestamp: Utc::now(),
                }),
            )
        }
    }
}
