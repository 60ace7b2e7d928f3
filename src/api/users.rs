//! Administrative user-account operations. Role enforcement is deliberately
//! absent; any authenticated session may call these.

use axum::{
    Json,
    extract::{Path, State},
};
use std::sync::Arc;
use tower_sessions::Session;

use super::auth::require_session_user;
use super::{ApiError, ApiResponse, AppState, MessageResponse};

/// POST /api/users/{id}/deactivate
pub async fn deactivate_user(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let actor_id = require_session_user(&session).await?;

    let deactivated = state.store.deactivate_user(id, Some(actor_id)).await?;
    if !deactivated {
        return Err(ApiError::not_found("User", id));
    }

    tracing::info!("User {id} deactivated by {actor_id}");
    Ok(Json(ApiResponse::success(MessageResponse::new(
        "User deactivated",
    ))))
}

/// POST /api/users/{id}/unlock
///
/// Clears both timed and permanent locks and zeroes the failed-attempt
/// counter.
pub async fn unlock_user(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let actor_id = require_session_user(&session).await?;

    let user = state
        .store
        .get_user_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User", id))?;

    state.store.unlock_user(user.id).await?;

    tracing::info!("User {id} unlocked by {actor_id}");
    Ok(Json(ApiResponse::success(MessageResponse::new(
        "User unlocked",
    ))))
}
