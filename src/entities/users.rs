use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Account status. LOCKED with a NULL `lock_until` is a permanent
/// (administrative) lock; LOCKED with a timestamp is a timed lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    #[sea_orm(string_value = "ACTIVE")]
    Active,
    #[sea_orm(string_value = "LOCKED")]
    Locked,
    #[sea_orm(string_value = "DEACTIVATED")]
    Deactivated,
}

/// Informational account classification; not enforced anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserType {
    #[sea_orm(string_value = "NORMAL")]
    Normal,
    #[sea_orm(string_value = "ADMIN")]
    Admin,
    #[sea_orm(string_value = "SYSTEM")]
    System,
    #[sea_orm(string_value = "SUPER")]
    Super,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Unique login handle.
    #[sea_orm(unique)]
    pub name: String,

    pub status: UserStatus,

    pub user_type: UserType,

    /// Argon2id password hash; opaque to everything but the hasher.
    pub password_hash: String,

    /// NULL means the password never expires.
    pub password_expiry_date: Option<Date>,

    pub num_failed_login_attempts: i32,

    pub lock_until: Option<DateTimeUtc>,

    pub is_first_login: bool,

    pub last_login_at: Option<DateTimeUtc>,

    /// Account validity window end; past dates are treated as DEACTIVATED.
    pub valid_until: Option<Date>,

    pub created_by: Option<i32>,

    pub created_at: DateTimeUtc,

    pub last_updated_by: Option<i32>,

    pub last_updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
