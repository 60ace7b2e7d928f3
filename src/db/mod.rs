use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use tracing::info;

pub mod migrator;
pub mod repositories;

pub use repositories::employee::{Employee, EmployeeUpdate, NewEmployee};
pub use repositories::user::{NewUser, UserRecord};

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if let Some(path_str) = db_url.strip_prefix("sqlite:")
            && !path_str.starts_with(":memory:")
            && !path_str.starts_with("memory")
        {
            let path_str = path_str.split('?').next().unwrap_or(path_str);
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn employee_repo(&self) -> repositories::employee::EmployeeRepository {
        repositories::employee::EmployeeRepository::new(self.conn.clone())
    }

    fn history_repo(&self) -> repositories::password_history::PasswordHistoryRepository {
        repositories::password_history::PasswordHistoryRepository::new(self.conn.clone())
    }

    fn settings_repo(&self) -> repositories::settings::SettingsRepository {
        repositories::settings::SettingsRepository::new(self.conn.clone())
    }

    // --- users ---

    pub async fn get_user_by_name(&self, name: &str) -> Result<Option<UserRecord>> {
        self.user_repo().get_by_name(name).await
    }

    pub async fn get_user_by_id(&self, user_id: i32) -> Result<Option<UserRecord>> {
        self.user_repo().get_by_id(user_id).await
    }

    pub async fn username_exists(&self, name: &str) -> Result<bool> {
        self.user_repo().name_exists(name).await
    }

    pub async fn increment_failed_attempts(&self, user_id: i32) -> Result<i32> {
        self.user_repo().increment_failed_attempts(user_id).await
    }

    pub async fn record_locked_attempt(&self, user_id: i32, now: DateTime<Utc>) -> Result<()> {
        self.user_repo().record_locked_attempt(user_id, now).await
    }

    pub async fn lock_user(&self, user_id: i32, now: DateTime<Utc>) -> Result<()> {
        self.user_repo().lock(user_id, now).await
    }

    pub async fn unlock_user(&self, user_id: i32) -> Result<()> {
        self.user_repo().unlock(user_id).await
    }

    pub async fn reset_failed_attempts(&self, user_id: i32) -> Result<()> {
        self.user_repo().reset_failed_attempts(user_id).await
    }

    pub async fn finish_login(&self, user_id: i32, now: DateTime<Utc>) -> Result<()> {
        self.user_repo().finish_login(user_id, now).await
    }

    pub async fn update_password(
        &self,
        user_id: i32,
        new_hash: &str,
        updated_by: Option<i32>,
    ) -> Result<()> {
        self.user_repo()
            .update_password(user_id, new_hash, updated_by)
            .await
    }

    pub async fn clear_first_login(&self, user_id: i32) -> Result<()> {
        self.user_repo().clear_first_login(user_id).await
    }

    pub async fn deactivate_user(&self, user_id: i32, actor_id: Option<i32>) -> Result<bool> {
        self.user_repo().deactivate(user_id, actor_id).await
    }

    pub async fn insert_user(&self, new_user: NewUser) -> Result<i32> {
        self.user_repo().insert(new_user).await
    }

    pub async fn create_user_account(
        &self,
        name: &str,
        password_hash: &str,
        employee_id: i32,
        password_expiry_date: NaiveDate,
        created_by: Option<i32>,
    ) -> Result<i32> {
        self.user_repo()
            .create_account(name, password_hash, employee_id, password_expiry_date, created_by)
            .await
    }

    // --- password history ---

    pub async fn append_password_history(&self, user_id: i32, password_hash: &str) -> Result<()> {
        self.history_repo()
            .append(user_id, password_hash, Utc::now())
            .await
    }

    pub async fn recent_password_hashes(&self, user_id: i32, limit: u64) -> Result<Vec<String>> {
        self.history_repo().recent_hashes(user_id, limit).await
    }

    // --- settings ---

    pub async fn load_password_settings(&self) -> Result<HashMap<String, String>> {
        self.settings_repo().load_password_settings().await
    }

    // --- employees ---

    pub async fn list_employees(&self) -> Result<Vec<Employee>> {
        self.employee_repo().list().await
    }

    pub async fn get_employee(&self, employee_id: i32) -> Result<Option<Employee>> {
        self.employee_repo().get(employee_id).await
    }

    pub async fn create_employee(
        &self,
        new_employee: NewEmployee,
        created_by: Option<i32>,
    ) -> Result<Employee> {
        self.employee_repo().create(new_employee, created_by).await
    }

    pub async fn update_employee(
        &self,
        employee_id: i32,
        update: EmployeeUpdate,
        updated_by: Option<i32>,
    ) -> Result<Option<Employee>> {
        self.employee_repo()
            .update(employee_id, update, updated_by)
            .await
    }

    pub async fn employees_starting_on(&self, date: NaiveDate) -> Result<Vec<Employee>> {
        self.employee_repo().starting_on(date).await
    }

    pub async fn employee_for_user(&self, user_id: i32) -> Result<Option<Employee>> {
        self.employee_repo().for_user(user_id).await
    }

    pub async fn employee_has_account(&self, employee_id: i32) -> Result<bool> {
        self.employee_repo().has_account(employee_id).await
    }

    pub async fn terminate_employee(
        &self,
        employee_id: i32,
        termination_date: NaiveDate,
        actor_id: Option<i32>,
    ) -> Result<bool> {
        self.employee_repo()
            .terminate(employee_id, termination_date, actor_id)
            .await
    }

    // --- counts for the status endpoint ---

    pub async fn count_users(&self) -> Result<u64> {
        use sea_orm::{EntityTrait, PaginatorTrait};
        Ok(crate::entities::users::Entity::find()
            .count(&self.conn)
            .await?)
    }

    pub async fn count_employees(&self) -> Result<u64> {
        use sea_orm::{EntityTrait, PaginatorTrait};
        Ok(crate::entities::employees::Entity::find()
            .count(&self.conn)
            .await?)
    }
}
