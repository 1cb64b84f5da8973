use chrono::{DateTime, Utc};
use sqlx::Row;

use trout_core::domain::user::{User, UserId, UserProfile};
use trout_core::errors::StoreError;
use trout_core::store::UserStore;

use super::{parse_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_slack_id(&self, slack_id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT slack_id, team_id, display_name, real_name, created_at, updated_at
             FROM slack_user WHERE slack_id = ?",
        )
        .bind(&slack_id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_user(r)?)),
            None => Ok(None),
        }
    }

    /// Inserts the profile projection. When the user is already cached the
    /// existing row wins and is returned unchanged.
    pub async fn insert_profile(
        &self,
        profile: &UserProfile,
        now: DateTime<Utc>,
    ) -> Result<User, RepositoryError> {
        let user = User::from_profile(profile, now);
        sqlx::query(
            "INSERT INTO slack_user (slack_id, team_id, display_name, real_name, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(slack_id) DO NOTHING",
        )
        .bind(&user.user_id.0)
        .bind(&user.team_id)
        .bind(&user.display_name)
        .bind(&user.real_name)
        .bind(user.created_at.to_rfc3339())
        .bind(user.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.find_by_slack_id(&user.user_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("slack user {}", user.user_id)))
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User, RepositoryError> {
    let slack_id: String =
        row.try_get("slack_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let team_id: String =
        row.try_get("team_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let display_name: String =
        row.try_get("display_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let real_name: String =
        row.try_get("real_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(User {
        user_id: UserId(slack_id),
        team_id,
        display_name,
        real_name,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait::async_trait]
impl UserStore for SqlUserRepository {
    async fn get_user_by_external_id(&self, user_id: &UserId) -> Result<Option<User>, StoreError> {
        Ok(self.find_by_slack_id(user_id).await?)
    }

    async fn create_user(&self, profile: &UserProfile) -> Result<User, StoreError> {
        Ok(self.insert_profile(profile, Utc::now()).await?)
    }
}
