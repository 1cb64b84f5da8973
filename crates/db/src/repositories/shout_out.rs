use chrono::{DateTime, Utc};
use sqlx::Row;

use trout_core::domain::shout_out::{ShoutOut, ShoutOutDraft, ShoutOutId, Visibility};
use trout_core::domain::user::UserId;
use trout_core::errors::StoreError;
use trout_core::store::ShoutOutStore;

use super::{parse_timestamp, RepositoryError};
use crate::DbPool;

const SHOUT_OUT_COLUMNS: &str = "id, from_user_id, to_user_id, message, is_public, is_anonymous,
                                 created_at, updated_at, released_at";

pub struct SqlShoutOutRepository {
    pool: DbPool,
}

impl SqlShoutOutRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        draft: &ShoutOutDraft,
        now: DateTime<Utc>,
    ) -> Result<ShoutOutId, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO shout_out (from_user_id, to_user_id, message, is_public, is_anonymous,
                                    created_at, updated_at, released_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, NULL)",
        )
        .bind(&draft.from_user.0)
        .bind(&draft.to_user.0)
        .bind(&draft.message)
        .bind(draft.is_public)
        .bind(draft.is_anonymous)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(ShoutOutId(result.last_insert_rowid()))
    }

    pub async fn find_by_id(&self, id: ShoutOutId) -> Result<Option<ShoutOut>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {SHOUT_OUT_COLUMNS} FROM shout_out WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_shout_out(r)?)),
            None => Ok(None),
        }
    }

    /// Upserts the record. A stored `released_at` is never cleared or moved.
    pub async fn upsert(&self, shout_out: &ShoutOut) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO shout_out (id, from_user_id, to_user_id, message, is_public, is_anonymous,
                                    created_at, updated_at, released_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 message = excluded.message,
                 is_public = excluded.is_public,
                 is_anonymous = excluded.is_anonymous,
                 updated_at = excluded.updated_at,
                 released_at = COALESCE(shout_out.released_at, excluded.released_at)",
        )
        .bind(shout_out.id.0)
        .bind(&shout_out.from_user.0)
        .bind(&shout_out.to_user.0)
        .bind(&shout_out.message)
        .bind(shout_out.is_public)
        .bind(shout_out.is_anonymous)
        .bind(shout_out.created_at.to_rfc3339())
        .bind(shout_out.updated_at.to_rfc3339())
        .bind(shout_out.released_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Sets `released_at` on one row without rewriting its settings.
    pub async fn record_release(
        &self,
        id: ShoutOutId,
        released_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let stamp = released_at.to_rfc3339();
        let result = sqlx::query(
            "UPDATE shout_out
             SET updated_at = CASE WHEN released_at IS NULL THEN ? ELSE updated_at END,
                 released_at = COALESCE(released_at, ?)
             WHERE id = ?",
        )
        .bind(&stamp)
        .bind(&stamp)
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("shout-out {id}")));
        }
        Ok(())
    }

    pub async fn list_unreleased(
        &self,
        visibility: Visibility,
    ) -> Result<Vec<ShoutOut>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {SHOUT_OUT_COLUMNS}
             FROM shout_out
             WHERE released_at IS NULL AND is_public = ?
             ORDER BY to_user_id ASC, id ASC"
        ))
        .bind(visibility.is_public())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_shout_out).collect::<Result<Vec<_>, _>>()
    }

    pub async fn count_unreleased(&self, visibility: Visibility) -> Result<i64, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM shout_out WHERE released_at IS NULL AND is_public = ?",
        )
        .bind(visibility.is_public())
        .fetch_one(&self.pool)
        .await?;

        row.try_get("count").map_err(|e| RepositoryError::Decode(e.to_string()))
    }
}

fn row_to_shout_out(row: &sqlx::sqlite::SqliteRow) -> Result<ShoutOut, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let from_user_id: String =
        row.try_get("from_user_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let to_user_id: String =
        row.try_get("to_user_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let message: String =
        row.try_get("message").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let is_public: bool =
        row.try_get("is_public").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let is_anonymous: bool =
        row.try_get("is_anonymous").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let released_at: Option<String> =
        row.try_get("released_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(ShoutOut {
        id: ShoutOutId(id),
        from_user: UserId(from_user_id),
        to_user: UserId(to_user_id),
        message,
        is_public,
        is_anonymous,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
        released_at: released_at
            .as_deref()
            .map(|value| parse_timestamp("released_at", value))
            .transpose()?,
    })
}

#[async_trait::async_trait]
impl ShoutOutStore for SqlShoutOutRepository {
    async fn create(&self, draft: ShoutOutDraft) -> Result<ShoutOutId, StoreError> {
        Ok(self.insert(&draft, Utc::now()).await?)
    }

    async fn get_by_id(&self, id: ShoutOutId) -> Result<Option<ShoutOut>, StoreError> {
        Ok(self.find_by_id(id).await?)
    }

    async fn save(&self, shout_out: &ShoutOut) -> Result<(), StoreError> {
        Ok(self.upsert(shout_out).await?)
    }

    async fn mark_released(
        &self,
        id: ShoutOutId,
        released_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        Ok(self.record_release(id, released_at).await?)
    }

    async fn find_unreleased(&self, visibility: Visibility) -> Result<Vec<ShoutOut>, StoreError> {
        Ok(self.list_unreleased(visibility).await?)
    }
}
