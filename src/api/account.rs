//! Self-service endpoints for the logged-in user.

use axum::{Json, extract::State};
use serde::Deserialize;
use std::sync::Arc;
use tower_sessions::Session;

use super::auth::require_session_user;
use super::extract::BodyPayload;
use super::{ApiError, ApiResponse, AppState, EmployeeDto, MessageResponse, ProfileDto};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnPasswordChangeRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_new_password: String,
}

/// GET /api/me/profile
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<ApiResponse<ProfileDto>>, ApiError> {
    let user_id = require_session_user(&session).await?;

    let user = state
        .store
        .get_user_by_id(user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User", user_id))?;

    let employee = state.store.employee_for_user(user_id).await?;

    Ok(Json(ApiResponse::success(ProfileDto {
        username: user.name,
        user_type: user.user_type,
        last_login_at: user.last_login_at,
        employee: employee.map(EmployeeDto::from),
    })))
}

/// PUT /api/me/password
///
/// Voluntary change; attested by the current password rather than a token.
pub async fn change_own_password(
    State(state): State<Arc<AppState>>,
    session: Session,
    BodyPayload(req): BodyPayload<OwnPasswordChangeRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let user_id = require_session_user(&session).await?;

    state
        .auth
        .change_password(
            user_id,
            &req.current_password,
            &req.new_password,
            &req.confirm_new_password,
        )
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Password updated successfully",
    ))))
}
