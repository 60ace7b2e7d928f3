use std::collections::HashMap;

use anyhow::{Context, Result};
use sea_orm::{DatabaseConnection, EntityTrait};

use crate::entities::password_settings;

pub struct SettingsRepository {
    conn: DatabaseConnection,
}

impl SettingsRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Loads the full password-policy catalogue. Read once at boot; dynamic
    /// reload is out of scope.
    pub async fn load_password_settings(&self) -> Result<HashMap<String, String>> {
        let rows = password_settings::Entity::find()
            .all(&self.conn)
            .await
            .context("Failed to load password settings")?;

        Ok(rows
            .into_iter()
            .map(|row| (row.config_key, row.config_value))
            .collect())
    }
}
