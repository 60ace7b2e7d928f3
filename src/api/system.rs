use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState, MessageResponse, SystemStatus};

/// GET /api/health
///
/// Open endpoint: 200 when the database answers, 503 otherwise.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success(MessageResponse::new("ok"))),
        ),
        Err(err) => {
            tracing::error!("Health check failed: {err:#}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::error("Database unavailable")),
            )
        }
    }
}

/// GET /api/system/status
pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<SystemStatus>>, ApiError> {
    let users = state.store.count_users().await?;
    let employees = state.store.count_employees().await?;

    Ok(Json(ApiResponse::success(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime: state.start_time.elapsed().as_secs(),
        users,
        employees,
    })))
}
