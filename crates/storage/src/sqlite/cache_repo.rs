use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::Row;
use study_core::model::{DailyProgress, UserId, WeeklyPlan};

use crate::repository::{LocalCache, StorageError};

use super::SqliteCache;

const PLAN_KEY: &str = "weekly_plan";
const PROGRESS_KEY: &str = "daily_progress";
const USER_ID_KEY: &str = "user_id";

impl SqliteCache {
    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let row = sqlx::query("SELECT value FROM local_cache WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| StorageError::Connection(err.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw: String = row
            .try_get("value")
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| StorageError::Serialization(format!("{key}: {err}")))
    }

    async fn put_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;

        sqlx::query(
            r"
            INSERT INTO local_cache (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            ",
        )
        .bind(key)
        .bind(raw)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        tracing::debug!(key, "local cache updated");
        Ok(())
    }

    async fn delete_key(&self, key: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM local_cache WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|err| StorageError::Connection(err.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl LocalCache for SqliteCache {
    async fn load_plan(&self) -> Result<Option<WeeklyPlan>, StorageError> {
        self.get_json(PLAN_KEY).await
    }

    async fn save_plan(&self, plan: &WeeklyPlan) -> Result<(), StorageError> {
        self.put_json(PLAN_KEY, plan).await
    }

    async fn clear_plan(&self) -> Result<(), StorageError> {
        self.delete_key(PLAN_KEY).await
    }

    async fn load_progress(&self) -> Result<Option<DailyProgress>, StorageError> {
        self.get_json(PROGRESS_KEY).await
    }

    async fn save_progress(&self, progress: &DailyProgress) -> Result<(), StorageError> {
        self.put_json(PROGRESS_KEY, progress).await
    }

    async fn clear_progress(&self) -> Result<(), StorageError> {
        self.delete_key(PROGRESS_KEY).await
    }

    async fn load_user_id(&self) -> Result<Option<UserId>, StorageError> {
        self.get_json(USER_ID_KEY).await
    }

    async fn save_user_id(&self, user_id: &UserId) -> Result<(), StorageError> {
        self.put_json(USER_ID_KEY, user_id).await
    }

    async fn clear_user_id(&self) -> Result<(), StorageError> {
        self.delete_key(USER_ID_KEY).await
    }
}
