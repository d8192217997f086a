//! Health check handlers.
//!
//! - `/health`: Liveness probe, process only
//! - `/ready`: Readiness probe, media server reachable via ListRooms

use crate::errors::ScError;
use crate::models::api::HealthResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;

/// Liveness probe handler. Checks no dependencies.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// Readiness probe handler.
///
/// Returns 503 when the media server control API cannot be reached. The
/// underlying error is logged, not returned.
#[tracing::instrument(skip_all, name = "sc.health.readiness")]
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, ScError> {
    if let Err(e) = state.control.list_rooms(&[]).await {
        tracing::warn!(target: "sc.handlers.health", error = %e, "Readiness check failed");
        return Err(ScError::ServiceUnavailable(
            "Media server unreachable".to_string(),
        ));
    }

    Ok(Json(HealthResponse {
        status: "ready".to_string(),
    }))
}
