use axum::{
    Json,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tower_sessions::{Expiry, Session};

use super::extract::BodyPayload;
use super::{ApiError, ApiResponse, AppState, MandatoryChangeResponse, MessageResponse, SessionInfo};
use crate::services::{AuthOutcome, ChangeReason};

/// Set only after a fully consummated authentication; the gate keys on it.
pub const SESSION_USER_ID: &str = "user_id";
/// One-shot token attesting a pending mandatory password change.
pub const SESSION_TEMP_TOKEN: &str = "temp_token";
pub const SESSION_CHANGE_REASON: &str = "change_reason";
/// Identifies the account during a pending mandatory change; distinct from
/// `user_id` so the gate keeps rejecting the session.
pub const SESSION_PENDING_USERNAME: &str = "pending_username";

const GENERIC_SESSION_MESSAGE: &str = "Invalid or inactive session";
const TEMPORARY_LOCK_MESSAGE: &str = "Your account is temporarily locked due to multiple failed \
                                      login attempts. Please try again later or contact support.";
const PERMANENT_LOCK_MESSAGE: &str = "Your account is locked. Please contact support.";

// ============================================================================
// Request types
// ============================================================================

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MandatoryChangeRequest {
    pub new_password: String,
    pub confirm_new_password: String,
    pub token: String,
}

// ============================================================================
// Middleware
// ============================================================================

/// Session gate for every protected route: the session must exist and hold a
/// user id, otherwise the handler is never invoked. Login, logout, the
/// mandatory-change endpoint, the session probe, and the health check are
/// mounted outside the gate.
pub async fn session_gate(
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    match session_user(&session).await? {
        Some(user_id) => {
            tracing::Span::current().record("user_id", user_id);
            Ok(next.run(request).await)
        }
        None => Err(ApiError::unauthorized(GENERIC_SESSION_MESSAGE)),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/auth/login
///
/// Any session presented with the attempt is destroyed up front, so a
/// pre-chosen session id can never become an authenticated one.
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    BodyPayload(req): BodyPayload<LoginRequest>,
) -> Result<Response, ApiError> {
    if req.username.is_empty() {
        return Err(ApiError::validation("Username is required"));
    }
    if req.password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }

    session.flush().await.map_err(session_error)?;

    let outcome = state.auth.authenticate(&req.username, &req.password).await?;

    match outcome {
        AuthOutcome::Success { user_id } => {
            session
                .insert(SESSION_USER_ID, user_id)
                .await
                .map_err(session_error)?;
            session.set_expiry(Some(Expiry::OnInactivity(time::Duration::minutes(
                state.config.session.inactivity_minutes,
            ))));
            session.cycle_id().await.map_err(session_error)?;

            Ok(Json(ApiResponse::success(MessageResponse::new(
                "Login successful",
            )))
            .into_response())
        }
        AuthOutcome::FirstLoginRequired { .. } => {
            start_mandatory_change(&state, &session, &req.username, ChangeReason::FirstLogin).await
        }
        AuthOutcome::PasswordExpired { .. } => {
            start_mandatory_change(&state, &session, &req.username, ChangeReason::PasswordExpired)
                .await
        }
        AuthOutcome::TemporarilyLocked { .. } => {
            Err(ApiError::unauthorized(TEMPORARY_LOCK_MESSAGE))
        }
        AuthOutcome::PermanentlyLocked => Err(ApiError::unauthorized(PERMANENT_LOCK_MESSAGE)),
        AuthOutcome::BadCredentials => {
            Err(ApiError::unauthorized("Invalid username or password"))
        }
    }
}

/// POST /api/auth/logout
///
/// Destroys the session unconditionally; safe on an already-dead session.
pub async fn logout(session: Session) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    session.flush().await.map_err(session_error)?;
    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Logout successful",
    ))))
}

/// POST /api/auth/change-password
///
/// Token-attested mandatory change. The submitted token must equal the
/// session's one-shot token under constant-time comparison; on success the
/// session is destroyed and the client logs in afresh.
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    session: Session,
    BodyPayload(req): BodyPayload<MandatoryChangeRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let stored_token: Option<String> = session
        .get(SESSION_TEMP_TOKEN)
        .await
        .map_err(session_error)?;

    let Some(stored_token) = stored_token else {
        return Err(ApiError::unauthorized(GENERIC_SESSION_MESSAGE));
    };

    if !constant_time_eq(&req.token, &stored_token) {
        return Err(ApiError::unauthorized(GENERIC_SESSION_MESSAGE));
    }

    let username: String = session
        .get(SESSION_PENDING_USERNAME)
        .await
        .map_err(session_error)?
        .ok_or_else(|| ApiError::unauthorized(GENERIC_SESSION_MESSAGE))?;

    state
        .auth
        .change_password_attested(&username, &req.new_password, &req.confirm_new_password)
        .await?;

    session.flush().await.map_err(session_error)?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Password changed successfully. Please log in with your new password.",
    ))))
}

/// GET /api/auth/session
///
/// Probe: 200 when the session is authenticated, 401 otherwise.
pub async fn session_probe(session: Session) -> Result<Json<ApiResponse<SessionInfo>>, ApiError> {
    match session_user(&session).await? {
        Some(user_id) => Ok(Json(ApiResponse::success(SessionInfo { user_id }))),
        None => Err(ApiError::unauthorized(GENERIC_SESSION_MESSAGE)),
    }
}

// ============================================================================
// Helpers
// ============================================================================

async fn start_mandatory_change(
    state: &AppState,
    session: &Session,
    username: &str,
    reason: ChangeReason,
) -> Result<Response, ApiError> {
    let token = generate_temp_token();

    session
        .insert(SESSION_TEMP_TOKEN, &token)
        .await
        .map_err(session_error)?;
    session
        .insert(SESSION_CHANGE_REASON, reason.as_str())
        .await
        .map_err(session_error)?;
    session
        .insert(SESSION_PENDING_USERNAME, username)
        .await
        .map_err(session_error)?;
    session.set_expiry(Some(Expiry::OnInactivity(time::Duration::minutes(
        state.config.session.remedial_minutes,
    ))));
    session.cycle_id().await.map_err(session_error)?;

    Ok(Json(ApiResponse::success(MandatoryChangeResponse {
        temp_token: token,
        reason: reason.as_str().to_string(),
    }))
    .into_response())
}

/// Reads the pinned user id from the session, if any.
pub async fn session_user(session: &Session) -> Result<Option<i32>, ApiError> {
    session.get::<i32>(SESSION_USER_ID).await.map_err(session_error)
}

/// Like [`session_user`], but 401 when the session is not authenticated.
pub async fn require_session_user(session: &Session) -> Result<i32, ApiError> {
    session_user(session)
        .await?
        .ok_or_else(|| ApiError::unauthorized(GENERIC_SESSION_MESSAGE))
}

fn session_error(err: tower_sessions::session::Error) -> ApiError {
    ApiError::internal(format!("Session error: {err}"))
}

/// One-shot token for the mandatory-change flow: 256 bits rendered as a
/// URL-safe hex string.
fn generate_temp_token() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();

    bytes.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

/// Compares without short-circuiting so the token cannot be guessed byte by
/// byte.
fn constant_time_eq(provided: &str, expected: &str) -> bool {
    provided.len() == expected.len()
        && provided
            .as_bytes()
            .iter()
            .zip(expected.as_bytes().iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}
