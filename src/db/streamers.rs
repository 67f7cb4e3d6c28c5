use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

/// A tracked Twitch channel
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StreamerRecord {
    pub id: i64,
    pub handle: String,
    pub twitch_user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_checked: Option<DateTime<Utc>>,
}

pub struct StreamerRepository {
    pool: SqlitePool,
}

impl StreamerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Start tracking a handle. Returns `None` when the handle is
    /// already tracked; handles are compared exactly as given.
    pub async fn create(&self, handle: &str) -> Result<Option<StreamerRecord>> {
        let result = sqlx::query(
            "INSERT INTO streamers (handle, created_at) VALUES (?1, ?2)",
        )
        .bind(handle)
        .bind(Utc::now())
        .execute(&self.pool)
        .await;

        let result = match result {
            Ok(result) => result,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let streamer = self
            .get_by_id(result.last_insert_rowid())
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve streamer after insert"))?;

        Ok(Some(streamer))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<StreamerRecord>> {
        let streamer = sqlx::query_as::<_, StreamerRecord>(
            "SELECT id, handle, twitch_user_id, created_at, last_checked
             FROM streamers WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(streamer)
    }

    pub async fn get_by_handle(&self, handle: &str) -> Result<Option<StreamerRecord>> {
        let streamer = sqlx::query_as::<_, StreamerRecord>(
            "SELECT id, handle, twitch_user_id, created_at, last_checked
             FROM streamers WHERE handle = ?1",
        )
        .bind(handle)
        .fetch_optional(&self.pool)
        .await?;

        Ok(streamer)
    }

    /// All tracked streamers, most recently added first
    pub async fn list_all(&self) -> Result<Vec<StreamerRecord>> {
        let streamers = sqlx::query_as::<_, StreamerRecord>(
            "SELECT id, handle, twitch_user_id, created_at, last_checked
             FROM streamers ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(streamers)
    }

    /// Record the resolved platform user id for a streamer
    pub async fn set_twitch_user_id(&self, id: i64, twitch_user_id: &str) -> Result<()> {
        sqlx::query("UPDATE streamers SET twitch_user_id = ?1 WHERE id = ?2")
            .bind(twitch_user_id)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Stamp the time of the last fully successful poll
    pub async fn set_last_checked(&self, id: i64, when: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE streamers SET last_checked = ?1 WHERE id = ?2")
            .bind(when)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Stop tracking a streamer, dropping their recorded VODs with them.
    /// Returns false when no such streamer exists.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        sqlx::query("DELETE FROM vods WHERE streamer_id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let result = sqlx::query("DELETE FROM streamers WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
