use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::error::AppError;
use crate::state::AppState;
use crate::types::HealthResponse;

// Health check - never rate limited or authenticated
pub async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse { status: "healthy", timestamp: chrono::Utc::now(), version: env!("CARGO_PKG_VERSION") }),
    )
}

// Metrics endpoint: returns JSON snapshot
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.get_snapshot())
}

pub async fn not_found() -> AppError {
    AppError::NotFound("Route not found".to_string())
}
