use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set, TransactionTrait,
};

use crate::entities::users::{self, UserStatus, UserType};
use crate::entities::{password_history, user_employee_links};

/// Value snapshot of a user row. The authentication engine decides
/// transitions on a snapshot and commits them through the narrow update
/// operations below; it never writes whole rows back.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i32,
    pub name: String,
    pub status: UserStatus,
    pub user_type: UserType,
    pub password_hash: String,
    pub password_expiry_date: Option<NaiveDate>,
    pub num_failed_login_attempts: i32,
    pub lock_until: Option<DateTime<Utc>>,
    pub is_first_login: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub valid_until: Option<NaiveDate>,
}

impl From<users::Model> for UserRecord {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            status: model.status,
            user_type: model.user_type,
            password_hash: model.password_hash,
            password_expiry_date: model.password_expiry_date,
            num_failed_login_attempts: model.num_failed_login_attempts,
            lock_until: model.lock_until,
            is_first_login: model.is_first_login,
            last_login_at: model.last_login_at,
            valid_until: model.valid_until,
        }
    }
}

/// Input for administrative account creation (bootstrap, tests, HR ops).
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub password_hash: String,
    pub status: UserStatus,
    pub user_type: UserType,
    pub is_first_login: bool,
    pub password_expiry_date: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
    pub created_by: Option<i32>,
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<UserRecord>> {
        let user = users::Entity::find()
            .filter(users::Column::Name.eq(name))
            .one(&self.conn)
            .await
            .context("Failed to query user by name")?;

        Ok(user.map(UserRecord::from))
    }

    pub async fn get_by_id(&self, user_id: i32) -> Result<Option<UserRecord>> {
        let user = users::Entity::find_by_id(user_id)
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?;

        Ok(user.map(UserRecord::from))
    }

    pub async fn name_exists(&self, name: &str) -> Result<bool> {
        let count = users::Entity::find()
            .filter(users::Column::Name.eq(name))
            .count(&self.conn)
            .await
            .context("Failed to check username availability")?;

        Ok(count > 0)
    }

    /// Atomically bumps the failed-attempt counter and returns the new count,
    /// so concurrent requests observe monotonic progress toward lockout.
    pub async fn increment_failed_attempts(&self, user_id: i32) -> Result<i32> {
        users::Entity::update_many()
            .col_expr(
                users::Column::NumFailedLoginAttempts,
                Expr::col(users::Column::NumFailedLoginAttempts).add(1),
            )
            .col_expr(users::Column::LastUpdatedAt, Expr::value(Utc::now()))
            .filter(users::Column::Id.eq(user_id))
            .exec(&self.conn)
            .await
            .context("Failed to increment failed login attempts")?;

        let user = self.load(user_id).await?;
        Ok(user.num_failed_login_attempts)
    }

    /// Failed attempt inside an active lock window: bump the counter and
    /// re-stamp the window start so the lock extends.
    pub async fn record_locked_attempt(&self, user_id: i32, now: DateTime<Utc>) -> Result<()> {
        users::Entity::update_many()
            .col_expr(
                users::Column::NumFailedLoginAttempts,
                Expr::col(users::Column::NumFailedLoginAttempts).add(1),
            )
            .col_expr(users::Column::LockUntil, Expr::value(Some(now)))
            .col_expr(users::Column::LastUpdatedAt, Expr::value(now))
            .filter(users::Column::Id.eq(user_id))
            .exec(&self.conn)
            .await
            .context("Failed to record attempt on locked account")?;

        Ok(())
    }

    pub async fn lock(&self, user_id: i32, now: DateTime<Utc>) -> Result<()> {
        let mut active: users::ActiveModel = self.load(user_id).await?.into();
        active.status = Set(UserStatus::Locked);
        active.lock_until = Set(Some(now));
        active.last_updated_at = Set(now);
        active
            .update(&self.conn)
            .await
            .context("Failed to lock user")?;

        Ok(())
    }

    /// Clears a lock: ACTIVE status, zeroed counter, no window.
    pub async fn unlock(&self, user_id: i32) -> Result<()> {
        let mut active: users::ActiveModel = self.load(user_id).await?.into();
        active.status = Set(UserStatus::Active);
        active.num_failed_login_attempts = Set(0);
        active.lock_until = Set(None);
        active.last_updated_at = Set(Utc::now());
        active
            .update(&self.conn)
            .await
            .context("Failed to unlock user")?;

        Ok(())
    }

    pub async fn reset_failed_attempts(&self, user_id: i32) -> Result<()> {
        let mut active: users::ActiveModel = self.load(user_id).await?.into();
        active.num_failed_login_attempts = Set(0);
        active.last_updated_at = Set(Utc::now());
        active
            .update(&self.conn)
            .await
            .context("Failed to reset failed login attempts")?;

        Ok(())
    }

    /// Fully consummated login: zero the counter and stamp `last_login_at`.
    pub async fn finish_login(&self, user_id: i32, now: DateTime<Utc>) -> Result<()> {
        let mut active: users::ActiveModel = self.load(user_id).await?.into();
        active.num_failed_login_attempts = Set(0);
        active.last_login_at = Set(Some(now));
        active.last_updated_at = Set(now);
        active
            .update(&self.conn)
            .await
            .context("Failed to record login")?;

        Ok(())
    }

    /// Persists a rotated password hash. Clears any expiry date; the
    /// onboarding job is the only writer that sets one.
    pub async fn update_password(
        &self,
        user_id: i32,
        new_hash: &str,
        updated_by: Option<i32>,
    ) -> Result<()> {
        let mut active: users::ActiveModel = self.load(user_id).await?.into();
        active.password_hash = Set(new_hash.to_owned());
        active.password_expiry_date = Set(None);
        active.last_updated_by = Set(updated_by);
        active.last_updated_at = Set(Utc::now());
        active
            .update(&self.conn)
            .await
            .context("Failed to update password")?;

        Ok(())
    }

    pub async fn clear_first_login(&self, user_id: i32) -> Result<()> {
        let mut active: users::ActiveModel = self.load(user_id).await?.into();
        active.is_first_login = Set(false);
        active.last_updated_at = Set(Utc::now());
        active
            .update(&self.conn)
            .await
            .context("Failed to clear first-login flag")?;

        Ok(())
    }

    pub async fn deactivate(&self, user_id: i32, actor_id: Option<i32>) -> Result<bool> {
        let Some(user) = users::Entity::find_by_id(user_id)
            .one(&self.conn)
            .await
            .context("Failed to query user for deactivation")?
        else {
            return Ok(false);
        };

        let mut active: users::ActiveModel = user.into();
        active.status = Set(UserStatus::Deactivated);
        active.last_updated_by = Set(actor_id);
        active.last_updated_at = Set(Utc::now());
        active
            .update(&self.conn)
            .await
            .context("Failed to deactivate user")?;

        Ok(true)
    }

    /// Administrative creation path; the onboarding job goes through
    /// [`Self::create_account`] instead.
    pub async fn insert(&self, new_user: NewUser) -> Result<i32> {
        let now = Utc::now();
        let user = users::ActiveModel {
            name: Set(new_user.name),
            status: Set(new_user.status),
            user_type: Set(new_user.user_type),
            password_hash: Set(new_user.password_hash.clone()),
            password_expiry_date: Set(new_user.password_expiry_date),
            num_failed_login_attempts: Set(0),
            is_first_login: Set(new_user.is_first_login),
            valid_until: Set(new_user.valid_until),
            created_by: Set(new_user.created_by),
            created_at: Set(now),
            last_updated_by: Set(new_user.created_by),
            last_updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert user")?;

        password_history::ActiveModel {
            user_id: Set(user.id),
            password_hash: Set(new_user.password_hash),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to record initial password history")?;

        Ok(user.id)
    }

    /// Creates a user, links it to the employee, and records the initial
    /// password hash in one transaction. The account starts first-login
    /// flagged with a bounded temporary-password expiry.
    pub async fn create_account(
        &self,
        name: &str,
        password_hash: &str,
        employee_id: i32,
        password_expiry_date: NaiveDate,
        created_by: Option<i32>,
    ) -> Result<i32> {
        let name = name.to_owned();
        let password_hash = password_hash.to_owned();

        let user_id = self
            .conn
            .transaction::<_, i32, sea_orm::DbErr>(|txn| {
                Box::pin(async move {
                    let now = Utc::now();
                    let user = users::ActiveModel {
                        name: Set(name),
                        status: Set(UserStatus::Active),
                        user_type: Set(UserType::Normal),
                        password_hash: Set(password_hash.clone()),
                        password_expiry_date: Set(Some(password_expiry_date)),
                        num_failed_login_attempts: Set(0),
                        is_first_login: Set(true),
                        created_by: Set(created_by),
                        created_at: Set(now),
                        last_updated_by: Set(created_by),
                        last_updated_at: Set(now),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;

                    user_employee_links::ActiveModel {
                        user_id: Set(user.id),
                        employee_id: Set(employee_id),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;

                    password_history::ActiveModel {
                        user_id: Set(user.id),
                        password_hash: Set(password_hash),
                        created_at: Set(now),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;

                    Ok(user.id)
                })
            })
            .await
            .context("Failed to create user account")?;

        Ok(user_id)
    }

    async fn load(&self, user_id: i32) -> Result<users::Model> {
        users::Entity::find_by_id(user_id)
            .one(&self.conn)
            .await
            .context("Failed to query user")?
            .ok_or_else(|| anyhow::anyhow!("User not found: {user_id}"))
    }
}
