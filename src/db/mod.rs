//! Database connection and operations

pub mod streamers;
pub mod vods;

use std::path::Path;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub use streamers::{StreamerRecord, StreamerRepository};
pub use vods::{CreateVod, VodRecord, VodRepository, VodStatus, VodWithStreamer};

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Get the maximum connection pool size from environment or default
    fn get_max_connections() -> u32 {
        std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10)
    }

    /// Open (creating if missing) the SQLite database at the given path
    pub async fn connect(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {parent:?}"))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(Self::get_max_connections())
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database at {path}"))?;

        Ok(Self { pool })
    }

    /// Create the tables and indexes if they do not exist yet
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS streamers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                handle TEXT NOT NULL UNIQUE,
                twitch_user_id TEXT,
                created_at TEXT NOT NULL,
                last_checked TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS vods (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                streamer_id INTEGER NOT NULL REFERENCES streamers(id),
                twitch_vod_id TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                url TEXT NOT NULL,
                duration_seconds INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                ended_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'new',
                discovered_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_vods_streamer_id ON vods (streamer_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_vods_ended_at ON vods (ended_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get a streamer repository
    pub fn streamers(&self) -> StreamerRepository {
        StreamerRepository::new(self.pool.clone())
    }

    /// Get a VOD repository
    pub fn vods(&self) -> VodRepository {
        VodRepository::new(self.pool.clone())
    }
}
