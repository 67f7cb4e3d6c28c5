use std::collections::HashSet;
use std::fmt;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

/// Triage state of a recorded VOD
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum VodStatus {
    New,
    InProgress,
    Clipped,
}

impl VodStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VodStatus::New => "new",
            VodStatus::InProgress => "in_progress",
            VodStatus::Clipped => "clipped",
        }
    }
}

impl fmt::Display for VodStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded broadcast archive
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VodRecord {
    pub id: i64,
    pub streamer_id: i64,
    pub twitch_vod_id: String,
    pub title: String,
    pub url: String,
    pub duration_seconds: i64,
    pub created_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub status: VodStatus,
    pub discovered_at: DateTime<Utc>,
}

/// Fields for recording a newly discovered VOD
#[derive(Debug)]
pub struct CreateVod {
    pub streamer_id: i64,
    pub twitch_vod_id: String,
    pub title: String,
    pub url: String,
    pub duration_seconds: i64,
    pub created_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

/// A VOD row joined with the handle of the streamer it belongs to
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VodWithStreamer {
    pub id: i64,
    pub streamer_id: i64,
    pub streamer_handle: String,
    pub twitch_vod_id: String,
    pub title: String,
    pub url: String,
    pub duration_seconds: i64,
    pub created_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub status: VodStatus,
    pub discovered_at: DateTime<Utc>,
}

/// Summary of a VOD removed by the retention sweep
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PurgedVod {
    pub id: i64,
    pub title: String,
    pub streamer_handle: String,
}

pub struct VodRepository {
    pool: SqlitePool,
}

impl VodRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a discovered VOD. Returns `None` when the platform VOD id
    /// is already recorded; new rows start in status `new`.
    pub async fn insert(&self, vod: &CreateVod) -> Result<Option<i64>> {
        let result = sqlx::query(
            "INSERT INTO vods
                (streamer_id, twitch_vod_id, title, url, duration_seconds,
                 created_at, ended_at, discovered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(vod.streamer_id)
        .bind(&vod.twitch_vod_id)
        .bind(&vod.title)
        .bind(&vod.url)
        .bind(vod.duration_seconds)
        .bind(vod.created_at)
        .bind(vod.ended_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await;

        match result {
            Ok(result) => Ok(Some(result.last_insert_rowid())),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<VodRecord>> {
        let vod = sqlx::query_as::<_, VodRecord>(
            "SELECT id, streamer_id, twitch_vod_id, title, url, duration_seconds,
                    created_at, ended_at, status, discovered_at
             FROM vods WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(vod)
    }

    /// Platform VOD ids already recorded for a streamer
    pub async fn existing_ids(&self, streamer_id: i64) -> Result<HashSet<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT twitch_vod_id FROM vods WHERE streamer_id = ?1",
        )
        .bind(streamer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().collect())
    }

    /// Every recorded VOD with its streamer handle, most recently ended first
    pub async fn list_all(&self) -> Result<Vec<VodWithStreamer>> {
        let vods = sqlx::query_as::<_, VodWithStreamer>(
            "SELECT v.id, v.streamer_id, s.handle AS streamer_handle, v.twitch_vod_id,
                    v.title, v.url, v.duration_seconds, v.created_at, v.ended_at,
                    v.status, v.discovered_at
             FROM vods v
             JOIN streamers s ON s.id = v.streamer_id
             ORDER BY v.ended_at DESC, v.id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(vods)
    }

    /// VODs recorded for one streamer, most recently ended first
    pub async fn list_by_streamer(&self, streamer_id: i64) -> Result<Vec<VodRecord>> {
        let vods = sqlx::query_as::<_, VodRecord>(
            "SELECT id, streamer_id, twitch_vod_id, title, url, duration_seconds,
                    created_at, ended_at, status, discovered_at
             FROM vods WHERE streamer_id = ?1
             ORDER BY ended_at DESC, id DESC",
        )
        .bind(streamer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(vods)
    }

    /// Move a VOD to a new triage status. Returns false when no such
    /// VOD exists.
    pub async fn update_status(&self, id: i64, status: VodStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE vods SET status = ?1 WHERE id = ?2")
            .bind(status)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete every VOD that ended strictly before the cutoff,
    /// returning how many went along with their summaries.
    pub async fn delete_ended_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<(u64, Vec<PurgedVod>)> {
        let purged = sqlx::query_as::<_, PurgedVod>(
            "SELECT v.id, v.title, s.handle AS streamer_handle
             FROM vods v
             JOIN streamers s ON s.id = v.streamer_id
             WHERE v.ended_at < ?1
             ORDER BY v.ended_at ASC",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let result = sqlx::query("DELETE FROM vods WHERE ended_at < ?1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok((result.rows_affected(), purged))
    }
}
