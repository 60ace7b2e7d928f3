use crate::entities::prelude::*;
use crate::entities::{password_settings, users};
use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Schema;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Seeded policy catalogue; administrators tune these rows directly.
const DEFAULT_PASSWORD_SETTINGS: &[(&str, &str)] = &[
    ("password.min_length", "8"),
    ("password.max_length", "64"),
    ("password.require_uppercase", "true"),
    ("password.require_lowercase", "true"),
    ("password.require_numbers", "true"),
    ("password.require_special_characters", "true"),
    ("password.num_failed_attempts_before_lockout", "5"),
    ("password.history_size", "3"),
    ("password.lockout_duration", "30"),
];

/// Bootstrap admin password; the first-login flag forces rotation.
const DEFAULT_ADMIN_PASSWORD: &str = "ChangeMe!123";

fn hash_default_password() -> String {
    use argon2::{
        Argon2,
        password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
    };

    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(DEFAULT_ADMIN_PASSWORD.as_bytes(), &salt)
        .expect("Failed to hash default admin password")
        .to_string()
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();
        let schema = Schema::new(backend);

        manager
            .create_table(
                schema
                    .create_table_from_entity(Users)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(Employees)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(PasswordHistory)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(PasswordSettings)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(UserEmployeeLinks)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        let mut seed_settings = sea_orm_migration::sea_query::Query::insert()
            .into_table(PasswordSettings)
            .columns([
                password_settings::Column::ConfigKey,
                password_settings::Column::ConfigValue,
            ])
            .to_owned();
        for (key, value) in DEFAULT_PASSWORD_SETTINGS {
            seed_settings.values_panic([(*key).into(), (*value).into()]);
        }
        manager.exec_stmt(seed_settings).await?;

        let now = chrono::Utc::now();
        let password_hash = hash_default_password();

        let seed_admin = sea_orm_migration::sea_query::Query::insert()
            .into_table(Users)
            .columns([
                users::Column::Name,
                users::Column::Status,
                users::Column::UserType,
                users::Column::PasswordHash,
                users::Column::NumFailedLoginAttempts,
                users::Column::IsFirstLogin,
                users::Column::CreatedAt,
                users::Column::LastUpdatedAt,
            ])
            .values_panic([
                "admin".into(),
                "ACTIVE".into(),
                "ADMIN".into(),
                password_hash.into(),
                0.into(),
                true.into(),
                now.into(),
                now.into(),
            ])
            .to_owned();
        manager.exec_stmt(seed_admin).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserEmployeeLinks).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PasswordSettings).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PasswordHistory).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Employees).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users).to_owned())
            .await?;

        Ok(())
    }
}
