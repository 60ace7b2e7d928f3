use sea_orm::entity::prelude::*;

/// Password policy catalogue, loaded once at boot into `PasswordPolicy`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "password_settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub config_key: String,

    pub config_value: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
