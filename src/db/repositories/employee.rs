use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Deserialize;

use crate::entities::employees::{self, EmploymentStatus, EmploymentType};
use crate::entities::{user_employee_links, users};

pub use crate::entities::employees::Model as Employee;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEmployee {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub manager_id: Option<i32>,
    pub job_title: Option<String>,
    pub department: Option<String>,
    pub employment_type: EmploymentType,
    pub hire_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub manager_id: Option<i32>,
    pub job_title: Option<String>,
    pub department: Option<String>,
    pub employment_type: Option<EmploymentType>,
    pub employment_status: Option<EmploymentStatus>,
    pub hire_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
}

pub struct EmployeeRepository {
    conn: DatabaseConnection,
}

impl EmployeeRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn list(&self) -> Result<Vec<Employee>> {
        employees::Entity::find()
            .order_by_asc(employees::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list employees")
    }

    pub async fn get(&self, employee_id: i32) -> Result<Option<Employee>> {
        employees::Entity::find_by_id(employee_id)
            .one(&self.conn)
            .await
            .context("Failed to query employee")
    }

    pub async fn create(&self, new_employee: NewEmployee, created_by: Option<i32>) -> Result<Employee> {
        let now = Utc::now();
        employees::ActiveModel {
            first_name: Set(new_employee.first_name),
            last_name: Set(new_employee.last_name),
            email: Set(new_employee.email),
            manager_id: Set(new_employee.manager_id),
            job_title: Set(new_employee.job_title),
            department: Set(new_employee.department),
            employment_type: Set(new_employee.employment_type),
            employment_status: Set(EmploymentStatus::Active),
            hire_date: Set(new_employee.hire_date),
            start_date: Set(new_employee.start_date),
            created_by: Set(created_by),
            created_at: Set(now),
            last_updated_by: Set(created_by),
            last_updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to create employee")
    }

    pub async fn update(
        &self,
        employee_id: i32,
        update: EmployeeUpdate,
        updated_by: Option<i32>,
    ) -> Result<Option<Employee>> {
        let Some(employee) = self.get(employee_id).await? else {
            return Ok(None);
        };

        let mut active: employees::ActiveModel = employee.into();
        if let Some(first_name) = update.first_name {
            active.first_name = Set(first_name);
        }
        if let Some(last_name) = update.last_name {
            active.last_name = Set(last_name);
        }
        if let Some(email) = update.email {
            active.email = Set(email);
        }
        if let Some(manager_id) = update.manager_id {
            active.manager_id = Set(Some(manager_id));
        }
        if let Some(job_title) = update.job_title {
            active.job_title = Set(Some(job_title));
        }
        if let Some(department) = update.department {
            active.department = Set(Some(department));
        }
        if let Some(employment_type) = update.employment_type {
            active.employment_type = Set(employment_type);
        }
        if let Some(employment_status) = update.employment_status {
            active.employment_status = Set(employment_status);
        }
        if let Some(hire_date) = update.hire_date {
            active.hire_date = Set(Some(hire_date));
        }
        if let Some(start_date) = update.start_date {
            active.start_date = Set(Some(start_date));
        }
        active.last_updated_by = Set(updated_by);
        active.last_updated_at = Set(Utc::now());

        let updated = active
            .update(&self.conn)
            .await
            .context("Failed to update employee")?;

        Ok(Some(updated))
    }

    /// New hires whose first working day is `date`, in stable id order.
    pub async fn starting_on(&self, date: NaiveDate) -> Result<Vec<Employee>> {
        employees::Entity::find()
            .filter(employees::Column::StartDate.eq(date))
            .order_by_asc(employees::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to query employees starting today")
    }

    /// Whether an account has already been provisioned for the employee.
    pub async fn has_account(&self, employee_id: i32) -> Result<bool> {
        use sea_orm::PaginatorTrait;

        let count = user_employee_links::Entity::find()
            .filter(user_employee_links::Column::EmployeeId.eq(employee_id))
            .count(&self.conn)
            .await
            .context("Failed to check employee account link")?;

        Ok(count > 0)
    }

    pub async fn for_user(&self, user_id: i32) -> Result<Option<Employee>> {
        let Some(link) = user_employee_links::Entity::find()
            .filter(user_employee_links::Column::UserId.eq(user_id))
            .one(&self.conn)
            .await
            .context("Failed to query user-employee link")?
        else {
            return Ok(None);
        };

        self.get(link.employee_id).await
    }

    /// Marks the employee terminated and deactivates the linked user account
    /// in one transaction. Returns false if the employee does not exist.
    pub async fn terminate(
        &self,
        employee_id: i32,
        termination_date: NaiveDate,
        actor_id: Option<i32>,
    ) -> Result<bool> {
        let terminated = self
            .conn
            .transaction::<_, bool, sea_orm::DbErr>(move |txn| {
                Box::pin(async move {
                    let Some(employee) = employees::Entity::find_by_id(employee_id).one(txn).await?
                    else {
                        return Ok(false);
                    };

                    let now = Utc::now();
                    let mut active: employees::ActiveModel = employee.into();
                    active.employment_status = Set(EmploymentStatus::Terminated);
                    active.termination_date = Set(Some(termination_date));
                    active.last_updated_by = Set(actor_id);
                    active.last_updated_at = Set(now);
                    active.update(txn).await?;

                    let link = user_employee_links::Entity::find()
                        .filter(user_employee_links::Column::EmployeeId.eq(employee_id))
                        .one(txn)
                        .await?;

                    if let Some(link) = link
                        && let Some(user) = users::Entity::find_by_id(link.user_id).one(txn).await?
                    {
                        let mut active: users::ActiveModel = user.into();
                        active.status = Set(crate::entities::users::UserStatus::Deactivated);
                        active.last_updated_by = Set(actor_id);
                        active.last_updated_at = Set(now);
                        active.update(txn).await?;
                    }

                    Ok(true)
                })
            })
            .await
            .context("Failed to terminate employee")?;

        Ok(terminated)
    }
}
