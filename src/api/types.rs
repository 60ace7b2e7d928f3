use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::db::Employee;
use crate::entities::employees::{EmploymentStatus, EmploymentType};
use crate::entities::users::UserType;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub user_id: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MandatoryChangeResponse {
    pub temp_token: String,
    pub reason: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeDto {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub manager_id: Option<i32>,
    pub job_title: Option<String>,
    pub department: Option<String>,
    pub employment_type: EmploymentType,
    pub employment_status: EmploymentStatus,
    pub hire_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub termination_date: Option<NaiveDate>,
}

impl From<Employee> for EmployeeDto {
    fn from(employee: Employee) -> Self {
        Self {
            id: employee.id,
            first_name: employee.first_name,
            last_name: employee.last_name,
            email: employee.email,
            manager_id: employee.manager_id,
            job_title: employee.job_title,
            department: employee.department,
            employment_type: employee.employment_type,
            employment_status: employee.employment_status,
            hire_date: employee.hire_date,
            start_date: employee.start_date,
            termination_date: employee.termination_date,
        }
    }
}

/// Self-service profile: the login account joined with the employee record,
/// when one is linked.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDto {
    pub username: String,
    pub user_type: UserType,
    pub last_login_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee: Option<EmployeeDto>,
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime: u64,
    pub users: u64,
    pub employees: u64,
}
