use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::dto::HealthResponse;
use crate::state::AppState;

/// Basic health probe. Excluded from rate limiting by contract.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Liveness probe; answers as long as the process is serving.
pub async fn live_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Readiness probe; degrades when the bucket store is unreachable.
pub async fn ready_handler(State(state): State<AppState>) -> Response {
    if state.bucket_store.is_healthy().await {
        (StatusCode::OK, Json(HealthResponse { status: "ok" })).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse { status: "degraded" }),
        )
            .into_response()
    }
}
