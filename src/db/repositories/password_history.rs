use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use crate::entities::password_history;

pub struct PasswordHistoryRepository {
    conn: DatabaseConnection,
}

impl PasswordHistoryRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn append(
        &self,
        user_id: i32,
        password_hash: &str,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        password_history::ActiveModel {
            user_id: Set(user_id),
            password_hash: Set(password_hash.to_owned()),
            created_at: Set(created_at),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to append password history entry")?;

        Ok(())
    }

    /// The most recent `limit` hashes for the user, newest first.
    pub async fn recent_hashes(&self, user_id: i32, limit: u64) -> Result<Vec<String>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let entries = password_history::Entity::find()
            .filter(password_history::Column::UserId.eq(user_id))
            .order_by_desc(password_history::Column::CreatedAt)
            .order_by_desc(password_history::Column::Id)
            .limit(limit)
            .all(&self.conn)
            .await
            .context("Failed to load password history")?;

        Ok(entries.into_iter().map(|e| e.password_hash).collect())
    }
}
