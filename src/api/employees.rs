//! HR employee records: thin CRUD over the store.

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use std::sync::Arc;
use tower_sessions::Session;

use super::auth::require_session_user;
use super::extract::BodyPayload;
use super::{ApiError, ApiResponse, AppState, EmployeeDto, MessageResponse};
use crate::db::{EmployeeUpdate, NewEmployee};

/// GET /api/employees
pub async fn list_employees(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<EmployeeDto>>>, ApiError> {
    let employees = state.store.list_employees().await?;
    Ok(Json(ApiResponse::success(
        employees.into_iter().map(EmployeeDto::from).collect(),
    )))
}

/// GET /api/employees/{id}
pub async fn get_employee(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<EmployeeDto>>, ApiError> {
    let employee = state
        .store
        .get_employee(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Employee", id))?;

    Ok(Json(ApiResponse::success(EmployeeDto::from(employee))))
}

/// POST /api/employees
pub async fn create_employee(
    State(state): State<Arc<AppState>>,
    session: Session,
    BodyPayload(req): BodyPayload<NewEmployee>,
) -> Result<Json<ApiResponse<EmployeeDto>>, ApiError> {
    let actor_id = require_session_user(&session).await?;

    if req.first_name.is_empty() || req.last_name.is_empty() {
        return Err(ApiError::validation("First and last name are required"));
    }
    if req.email.is_empty() {
        return Err(ApiError::validation("Email is required"));
    }

    let employee = state.store.create_employee(req, Some(actor_id)).await?;
    Ok(Json(ApiResponse::success(EmployeeDto::from(employee))))
}

/// PUT /api/employees/{id}
pub async fn update_employee(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<i32>,
    BodyPayload(req): BodyPayload<EmployeeUpdate>,
) -> Result<Json<ApiResponse<EmployeeDto>>, ApiError> {
    let actor_id = require_session_user(&session).await?;

    let employee = state
        .store
        .update_employee(id, req, Some(actor_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Employee", id))?;

    Ok(Json(ApiResponse::success(EmployeeDto::from(employee))))
}

/// POST /api/employees/{id}/terminate
///
/// Marks the employee terminated and deactivates the linked account in one
/// transaction.
pub async fn terminate_employee(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let actor_id = require_session_user(&session).await?;

    let terminated = state
        .store
        .terminate_employee(id, Utc::now().date_naive(), Some(actor_id))
        .await?;

    if !terminated {
        return Err(ApiError::not_found("Employee", id));
    }

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Employee terminated",
    ))))
}
